use diesel::result::DatabaseErrorKind;

use crate::tournaments::TournamentStatus;

/// Errors returned by the pairing, allocation and progression operations.
///
/// Any failure that happens after the operation has started writing is
/// wrapped in [`Error::RolledBack`], so callers can always tell whether the
/// store was touched.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid pairing input: {0}")]
    InvalidPairingInput(String),
    #[error(
        "not enough courtrooms: {needed} trials need a room but only \
         {available} are free"
    )]
    InsufficientCapacity { needed: usize, available: usize },
    #[error(
        "not enough teams to fill the bracket: {needed} slots but only \
         {available} teams"
    )]
    InsufficientTeams { needed: usize, available: usize },
    #[error("cannot move a tournament from `{from}` to `{to}`")]
    InvalidStateTransition {
        from: TournamentStatus,
        to: TournamentStatus,
    },
    #[error("the tournament is `{0}`, but this requires an active tournament")]
    TournamentNotActive(TournamentStatus),
    #[error("round {0} has already been published")]
    RoundPublished(String),
    #[error("round is not ready: {0}")]
    RoundNotReady(String),
    #[error("pairings already exist for round {0}")]
    PairingsExist(String),
    #[error("pairing generation is already in progress for round {0}")]
    PairingInProgress(String),
    #[error("the entity store is unavailable: {0}")]
    StoreUnavailable(String),
    #[error("validation failed: {0}")]
    ValidationFailed(String),
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error("{0} (all writes made by this operation were rolled back)")]
    RolledBack(Box<Error>),
}

impl Error {
    /// Returns `true` if the operation failed before it wrote anything.
    pub fn wrote_nothing(&self) -> bool {
        !matches!(self, Error::RolledBack(_))
    }

    /// The underlying error, looking through [`Error::RolledBack`].
    pub fn root(&self) -> &Error {
        match self {
            Error::RolledBack(inner) => inner.root(),
            other => other,
        }
    }

    /// Marks an error raised inside a write transaction.
    pub(crate) fn rolled_back(self) -> Self {
        match self {
            Error::RolledBack(_) => self,
            other => Error::RolledBack(Box::new(other)),
        }
    }
}

impl From<diesel::result::Error> for Error {
    fn from(err: diesel::result::Error) -> Self {
        use diesel::result::Error as DieselError;

        match err {
            DieselError::NotFound => Error::NotFound("no such record".into()),
            DieselError::DatabaseError(kind, info) => match kind {
                DatabaseErrorKind::UniqueViolation
                | DatabaseErrorKind::ForeignKeyViolation
                | DatabaseErrorKind::NotNullViolation
                | DatabaseErrorKind::CheckViolation => {
                    Error::ValidationFailed(info.message().to_string())
                }
                DatabaseErrorKind::ClosedConnection
                | DatabaseErrorKind::UnableToSendCommand => {
                    Error::StoreUnavailable(info.message().to_string())
                }
                _ if is_busy(info.message()) => {
                    Error::StoreUnavailable(info.message().to_string())
                }
                _ => Error::Internal(info.message().to_string()),
            },
            DieselError::BrokenTransactionManager => {
                Error::StoreUnavailable("broken transaction manager".into())
            }
            other => Error::Internal(other.to_string()),
        }
    }
}

impl From<diesel::r2d2::PoolError> for Error {
    fn from(err: diesel::r2d2::PoolError) -> Self {
        Error::StoreUnavailable(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Internal(err.to_string())
    }
}

fn is_busy(message: &str) -> bool {
    message.contains("database is locked") || message.contains("busy")
}

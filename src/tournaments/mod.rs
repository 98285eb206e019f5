use std::str::FromStr;

use chrono::NaiveDateTime;
use diesel::{
    SqliteConnection,
    backend::Backend,
    deserialize::{self, FromSql, FromSqlRow},
    expression::AsExpression,
    prelude::*,
    serialize::{self, IsNull, Output, ToSql},
    sql_types::Text,
    sqlite::Sqlite,
};
use serde::{Deserialize, Serialize};

use crate::{
    Error,
    schema::{self, round_byes, round_tickets, tournaments, trials},
    store::new_id,
    validation,
};

pub mod config;
pub mod courtrooms;
pub mod progression;
pub mod rounds;
pub mod schools;
pub mod standings;
pub mod teams;

/// Lifecycle of a tournament. Transitions only ever move one step forward.
#[derive(
    Serialize,
    Deserialize,
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    AsExpression,
    FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum TournamentStatus {
    Draft,
    Registration,
    Active,
    Completed,
}

impl TournamentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TournamentStatus::Draft => "draft",
            TournamentStatus::Registration => "registration",
            TournamentStatus::Active => "active",
            TournamentStatus::Completed => "completed",
        }
    }

    /// The status which directly follows this one, if any.
    pub fn successor(&self) -> Option<TournamentStatus> {
        match self {
            TournamentStatus::Draft => Some(TournamentStatus::Registration),
            TournamentStatus::Registration => Some(TournamentStatus::Active),
            TournamentStatus::Active => Some(TournamentStatus::Completed),
            TournamentStatus::Completed => None,
        }
    }

    /// Checks that `to` is the direct successor of this status.
    pub fn transition(self, to: TournamentStatus) -> Result<Self, Error> {
        match (self, to) {
            (TournamentStatus::Draft, TournamentStatus::Registration)
            | (TournamentStatus::Registration, TournamentStatus::Active)
            | (TournamentStatus::Active, TournamentStatus::Completed) => Ok(to),
            (from, to) => Err(Error::InvalidStateTransition { from, to }),
        }
    }
}

impl std::fmt::Display for TournamentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TournamentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(TournamentStatus::Draft),
            "registration" => Ok(TournamentStatus::Registration),
            "active" => Ok(TournamentStatus::Active),
            "completed" => Ok(TournamentStatus::Completed),
            other => Err(format!("unknown tournament status `{other}`")),
        }
    }
}

impl ToSql<Text, Sqlite> for TournamentStatus {
    fn to_sql<'b>(
        &'b self,
        out: &mut Output<'b, '_, Sqlite>,
    ) -> serialize::Result {
        out.set_value(self.as_str());
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Sqlite> for TournamentStatus {
    fn from_sql(
        bytes: <Sqlite as Backend>::RawValue<'_>,
    ) -> deserialize::Result<Self> {
        let text = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
        Ok(text.parse()?)
    }
}

#[derive(Queryable, Selectable, Serialize, Deserialize, Clone, Debug)]
#[diesel(table_name = tournaments)]
#[diesel(check_for_backend(Sqlite))]
pub struct Tournament {
    pub id: String,
    pub name: String,
    pub year: i64,
    pub num_preliminary_rounds: i64,
    pub num_elimination_rounds: i64,
    pub status: TournamentStatus,
    pub created: NaiveDateTime,
    pub updated: NaiveDateTime,
}

#[derive(Deserialize, Clone, Debug)]
pub struct NewTournament {
    pub name: String,
    pub year: i64,
    pub num_preliminary_rounds: i64,
    pub num_elimination_rounds: i64,
}

impl NewTournament {
    fn validate(&self) -> Result<(), Error> {
        validation::required("name", &self.name, 200)?;
        validation::non_negative(
            "num_preliminary_rounds",
            self.num_preliminary_rounds,
        )?;
        check_elimination_rounds(self.num_elimination_rounds)
    }
}

fn check_elimination_rounds(rounds: i64) -> Result<(), Error> {
    validation::non_negative("num_elimination_rounds", rounds)?;
    // 2^62 bracket slots is already far beyond anything representable
    if rounds > 62 {
        return Err(Error::ValidationFailed(
            "`num_elimination_rounds` is too large".to_string(),
        ));
    }
    Ok(())
}

#[derive(AsChangeset, Deserialize, Default, Clone, Debug)]
#[diesel(table_name = tournaments)]
pub struct TournamentChanges {
    pub name: Option<String>,
    pub year: Option<i64>,
    pub num_preliminary_rounds: Option<i64>,
    pub num_elimination_rounds: Option<i64>,
}

impl Tournament {
    #[tracing::instrument(skip(conn))]
    pub fn fetch(
        tournament_id: &str,
        conn: &mut SqliteConnection,
    ) -> Result<Tournament, Error> {
        tournaments::table
            .filter(tournaments::id.eq(tournament_id))
            .select(Tournament::as_select())
            .first(conn)
            .optional()?
            .ok_or_else(|| {
                Error::NotFound(format!("tournament {tournament_id}"))
            })
    }

    pub fn list(conn: &mut SqliteConnection) -> Result<Vec<Tournament>, Error> {
        Ok(tournaments::table
            .order_by((tournaments::year.desc(), tournaments::name.asc()))
            .select(Tournament::as_select())
            .load(conn)?)
    }

    /// Creates a new tournament, in the `draft` state.
    #[tracing::instrument(skip(conn))]
    pub fn create(
        new: &NewTournament,
        conn: &mut SqliteConnection,
    ) -> Result<Tournament, Error> {
        new.validate()?;

        let id = new_id();
        diesel::insert_into(tournaments::table)
            .values((
                tournaments::id.eq(&id),
                tournaments::name.eq(&new.name),
                tournaments::year.eq(new.year),
                tournaments::num_preliminary_rounds
                    .eq(new.num_preliminary_rounds),
                tournaments::num_elimination_rounds
                    .eq(new.num_elimination_rounds),
                tournaments::status.eq(TournamentStatus::Draft),
            ))
            .execute(conn)?;

        tracing::info!(tournament = %id, "created tournament");

        Tournament::fetch(&id, conn)
    }

    #[tracing::instrument(skip(self, conn), fields(tournament = %self.id))]
    pub fn update(
        &self,
        changes: &TournamentChanges,
        conn: &mut SqliteConnection,
    ) -> Result<Tournament, Error> {
        if let Some(name) = &changes.name {
            validation::required("name", name, 200)?;
        }
        if let Some(rounds) = changes.num_preliminary_rounds {
            validation::non_negative("num_preliminary_rounds", rounds)?;
        }
        if let Some(rounds) = changes.num_elimination_rounds {
            check_elimination_rounds(rounds)?;
        }

        diesel::update(tournaments::table.filter(tournaments::id.eq(&self.id)))
            .set((changes, tournaments::updated.eq(diesel::dsl::now)))
            .execute(conn)?;

        Tournament::fetch(&self.id, conn)
    }

    /// Moves the tournament to `to`, which must directly follow its current
    /// status.
    ///
    /// The write only succeeds if the stored status is still the one that
    /// was read, so two administrators racing on the same transition cannot
    /// both succeed.
    #[tracing::instrument(skip(conn))]
    pub fn transition(
        tournament_id: &str,
        to: TournamentStatus,
        conn: &mut SqliteConnection,
    ) -> Result<Tournament, Error> {
        let tournament = Tournament::fetch(tournament_id, conn)?;
        tournament.status.transition(to)?;

        let updated = diesel::update(
            tournaments::table.filter(
                tournaments::id
                    .eq(tournament_id)
                    .and(tournaments::status.eq(tournament.status)),
            ),
        )
        .set((
            tournaments::status.eq(to),
            tournaments::updated.eq(diesel::dsl::now),
        ))
        .execute(conn)?;

        if updated == 0 {
            let current = Tournament::fetch(tournament_id, conn)?;
            return Err(Error::InvalidStateTransition {
                from: current.status,
                to,
            });
        }

        tracing::info!(from = %tournament.status, %to, "tournament status changed");

        Tournament::fetch(tournament_id, conn)
    }

    pub fn require_active(&self) -> Result<(), Error> {
        match self.status {
            TournamentStatus::Active => Ok(()),
            other => Err(Error::TournamentNotActive(other)),
        }
    }

    /// Number of teams which break to the elimination bracket.
    pub fn bracket_size(&self) -> usize {
        u32::try_from(self.num_elimination_rounds)
            .ok()
            .and_then(|rounds| 1usize.checked_shl(rounds))
            .unwrap_or(usize::MAX)
    }

    /// Deletes the tournament along with everything it owns: its rounds
    /// (and their trials, byes and tickets) and its teams.
    #[tracing::instrument(skip(conn))]
    pub fn delete(
        tournament_id: &str,
        conn: &mut SqliteConnection,
    ) -> Result<(), Error> {
        Tournament::fetch(tournament_id, conn)?;

        conn.transaction(|conn| -> Result<(), Error> {
            let round_ids = schema::rounds::table
                .filter(schema::rounds::tournament.eq(tournament_id))
                .select(schema::rounds::id)
                .load::<String>(conn)?;

            diesel::delete(trials::table.filter(trials::round.eq_any(&round_ids)))
                .execute(conn)?;
            diesel::delete(
                round_byes::table.filter(round_byes::round.eq_any(&round_ids)),
            )
            .execute(conn)?;
            diesel::delete(
                round_tickets::table
                    .filter(round_tickets::round.eq_any(&round_ids)),
            )
            .execute(conn)?;
            diesel::delete(
                schema::rounds::table
                    .filter(schema::rounds::tournament.eq(tournament_id)),
            )
            .execute(conn)?;
            diesel::delete(
                schema::teams::table
                    .filter(schema::teams::tournament.eq(tournament_id)),
            )
            .execute(conn)?;
            diesel::delete(
                tournaments::table.filter(tournaments::id.eq(tournament_id)),
            )
            .execute(conn)?;
            Ok(())
        })
        .map_err(Error::rolled_back)?;

        tracing::info!("deleted tournament");

        Ok(())
    }
}

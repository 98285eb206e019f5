//! Generates the trials of a round.
//!
//! Pairing happens in three steps, following the same pattern as other
//! long-running writes:
//!
//! 1. a ticket is taken out for the round, which stops anybody else from
//!    pairing it at the same time (unless they override it)
//! 2. the pairing is computed outside of any transaction
//! 3. the trials are written, but only if our ticket is still the newest one
//!    for the round
//!
//! Either every trial (and bye) of the round is written, or none are.

use chrono::Utc;
use diesel::{SqliteConnection, prelude::*};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use serde::Serialize;

use crate::{
    Error,
    schema::{round_byes, round_tickets, trials},
    store::new_id,
    tournaments::{
        Tournament,
        config::PairingPolicy,
        progression,
        rounds::{
            Round, RoundKind, TournamentRounds,
            trials::{Bye, Side, Trial},
        },
        standings::{Scoresheet, Standings, history::TeamHistory},
        teams::Team,
    },
};

pub mod elimination;
pub mod power;

const TICKET_KIND: &str = "pairing";

/// Everything a preliminary pairing is computed from.
pub struct PairingInput {
    pub round: Round,
    /// The teams to pair (every team of the tournament).
    pub teams: Vec<Team>,
    pub standings: Standings,
    pub history: TeamHistory,
    pub policy: PairingPolicy,
    pub rng: ChaCha20Rng,
}

#[derive(Clone, Debug)]
pub struct ProposedTrial {
    pub prosecution: Team,
    pub defense: Team,
}

/// The output of a pairing algorithm, before it is written to the store.
#[derive(Clone, Debug, Default)]
pub struct Pairing {
    pub trials: Vec<ProposedTrial>,
    pub byes: Vec<Team>,
    pub warnings: Vec<UnresolvableConstraint>,
}

/// A pairing rule which had to be broken. The pairing is still written, but
/// these should be shown to the tabulation staff for review.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "constraint", rename_all = "snake_case")]
pub enum UnresolvableConstraint {
    /// The team argues the same side as it did in the previous round.
    SideRepeat { team: String, side: Side },
    /// The two teams have already met in an earlier round.
    OpponentRepeat { teams: (String, String) },
    /// The team sits out this round.
    Bye { team: String },
}

#[derive(Serialize, Clone, Debug)]
pub struct GeneratedPairings {
    pub round: Round,
    pub trials: Vec<Trial>,
    pub byes: Vec<Bye>,
    pub warnings: Vec<UnresolvableConstraint>,
}

/// Pairs the round and writes its trials.
///
/// If the round already has trials this fails with
/// [`Error::PairingsExist`] unless `force` is set, in which case the existing
/// trials are replaced. `force` also overrides a pairing which is still in
/// progress for the same round: the pairing which started first will then
/// fail with [`Error::PairingInProgress`] when it tries to write.
///
/// **Important**: this function is long-running and should always be
/// executed on a background thread (i.e. not the async executor).
#[tracing::instrument(skip(policy, scores, conn))]
pub fn generate_pairings(
    round_id: &str,
    policy: &PairingPolicy,
    scores: &dyn Scoresheet,
    force: bool,
    conn: &mut SqliteConnection,
) -> Result<GeneratedPairings, Error> {
    let round = Round::fetch(round_id, conn)?;
    let tournament = Tournament::fetch(&round.tournament, conn)?;
    tournament.require_active()?;
    check_can_pair(&round, force, conn)?;

    let ticket = Ticket::acquire(&round.id, force, conn)?;

    let pairing = match compute_pairing(&tournament, &round, policy, scores, conn)
    {
        Ok(pairing) => pairing,
        Err(e) => {
            ticket.release_or_log(conn);
            return Err(e);
        }
    };

    let outcome = conn.immediate_transaction(|conn| -> Result<_, Error> {
        if !ticket.is_current(conn)? {
            return Err(Error::PairingInProgress(round.id.clone()));
        }
        // the round may have changed while the pairing was computed
        let round = Round::fetch(&round.id, conn)?;
        check_can_pair(&round, force, conn)?;

        (|| -> Result<_, Error> {
            clear_pairing(&round.id, conn)?;
            let (trials, byes) = write_pairing(&round.id, &pairing, conn)?;
            ticket.release_up_to(conn)?;
            Ok((round, trials, byes))
        })()
        .map_err(Error::rolled_back)
    });

    let (round, trials, byes) = match outcome {
        Ok(written) => written,
        Err(e) => {
            ticket.release_or_log(conn);
            return Err(e);
        }
    };

    tracing::info!(
        trials = trials.len(),
        byes = byes.len(),
        warnings = pairing.warnings.len(),
        "paired round"
    );

    Ok(GeneratedPairings {
        round,
        trials,
        byes,
        warnings: pairing.warnings,
    })
}

fn check_can_pair(
    round: &Round,
    force: bool,
    conn: &mut SqliteConnection,
) -> Result<(), Error> {
    if round.published {
        return Err(Error::RoundPublished(round.id.clone()));
    }

    if !force {
        let paired = diesel::select(diesel::dsl::exists(
            trials::table.filter(trials::round.eq(&round.id)),
        ))
        .get_result::<bool>(conn)?;
        if paired {
            return Err(Error::PairingsExist(round.id.clone()));
        }
    }

    Ok(())
}

/// Loads everything the round's pairing depends on and runs the pairing
/// algorithm for its kind of round.
fn compute_pairing(
    tournament: &Tournament,
    round: &Round,
    policy: &PairingPolicy,
    scores: &dyn Scoresheet,
    conn: &mut SqliteConnection,
) -> Result<Pairing, Error> {
    match round.kind {
        RoundKind::Preliminary => {
            tracing::debug!(
                first_round = %policy.first_round,
                bye = %policy.bye,
                "pairing preliminary round"
            );
            let teams = Team::of_tournament(&tournament.id, conn)?;
            let standings = Standings::compute(teams.clone(), scores);
            let history =
                TeamHistory::fetch(&tournament.id, round.number, conn)?;

            let rng = match policy.seed {
                Some(seed) => ChaCha20Rng::seed_from_u64(seed),
                None => ChaCha20Rng::from_os_rng(),
            };

            power::pair_preliminary(PairingInput {
                round: round.clone(),
                teams,
                standings,
                history,
                policy: policy.clone(),
                rng,
            })
        }
        RoundKind::Elimination => {
            let rounds = TournamentRounds::fetch(&tournament.id, conn)?;
            progression::pair_elimination_round(
                tournament,
                &rounds,
                round.number,
                policy,
                scores,
                conn,
            )
        }
    }
}

/// Deletes the trials and byes of a round. Only valid inside a transaction
/// which writes the replacement pairing.
fn clear_pairing(
    round_id: &str,
    conn: &mut SqliteConnection,
) -> Result<(), Error> {
    let removed = diesel::delete(trials::table.filter(trials::round.eq(round_id)))
        .execute(conn)?;
    diesel::delete(round_byes::table.filter(round_byes::round.eq(round_id)))
        .execute(conn)?;

    if removed > 0 {
        tracing::warn!(removed, "replacing existing pairings");
    }

    Ok(())
}

/// Inserts the trials and byes of a pairing, returning them as stored.
///
/// Should be called inside a transaction.
pub(crate) fn write_pairing(
    round_id: &str,
    pairing: &Pairing,
    conn: &mut SqliteConnection,
) -> Result<(Vec<Trial>, Vec<Bye>), Error> {
    let now = Utc::now().naive_utc();

    let trial_rows = pairing
        .trials
        .iter()
        .enumerate()
        .map(|(i, trial)| {
            (
                trials::id.eq(new_id()),
                trials::round.eq(round_id.to_string()),
                trials::prosecution_team.eq(trial.prosecution.id.clone()),
                trials::defense_team.eq(trial.defense.id.clone()),
                trials::courtroom.eq(None::<String>),
                trials::created
                    .eq(now + chrono::Duration::microseconds(i as i64)),
                trials::updated.eq(now),
            )
        })
        .collect::<Vec<_>>();

    if !trial_rows.is_empty() {
        diesel::insert_into(trials::table)
            .values(&trial_rows)
            .execute(conn)?;
    }

    let bye_rows = pairing
        .byes
        .iter()
        .map(|team| {
            (
                round_byes::id.eq(new_id()),
                round_byes::round.eq(round_id.to_string()),
                round_byes::team.eq(team.id.clone()),
                round_byes::created.eq(now),
            )
        })
        .collect::<Vec<_>>();

    if !bye_rows.is_empty() {
        diesel::insert_into(round_byes::table)
            .values(&bye_rows)
            .execute(conn)?;
    }

    Ok((Trial::of_round(round_id, conn)?, Bye::of_round(round_id, conn)?))
}

/// A claim on pairing a round.
///
/// Tickets for a round are numbered in the order they were taken out; only
/// the newest ticket may write a pairing.
#[derive(Debug)]
struct Ticket {
    id: String,
    round: String,
    seq: i64,
}

impl Ticket {
    fn acquire(
        round_id: &str,
        force: bool,
        conn: &mut SqliteConnection,
    ) -> Result<Ticket, Error> {
        conn.immediate_transaction(|conn| -> Result<Ticket, Error> {
            let in_flight = diesel::select(diesel::dsl::exists(
                round_tickets::table.filter(
                    round_tickets::round
                        .eq(round_id)
                        .and(round_tickets::kind.eq(TICKET_KIND))
                        .and(round_tickets::released.eq(false)),
                ),
            ))
            .get_result::<bool>(conn)?;

            if in_flight && !force {
                return Err(Error::PairingInProgress(round_id.to_string()));
            } else if in_flight {
                tracing::warn!("overriding a pairing which is in progress");
            }

            let last_seq = round_tickets::table
                .filter(
                    round_tickets::round
                        .eq(round_id)
                        .and(round_tickets::kind.eq(TICKET_KIND)),
                )
                .select(diesel::dsl::max(round_tickets::seq))
                .get_result::<Option<i64>>(conn)?;

            let ticket = Ticket {
                id: new_id(),
                round: round_id.to_string(),
                seq: last_seq.map_or(0, |seq| seq + 1),
            };

            diesel::insert_into(round_tickets::table)
                .values((
                    round_tickets::id.eq(&ticket.id),
                    round_tickets::round.eq(&ticket.round),
                    round_tickets::seq.eq(ticket.seq),
                    round_tickets::kind.eq(TICKET_KIND),
                    round_tickets::acquired.eq(diesel::dsl::now),
                    round_tickets::released.eq(false),
                ))
                .execute(conn)?;

            Ok(ticket)
        })
    }

    fn is_current(&self, conn: &mut SqliteConnection) -> Result<bool, Error> {
        let superseded = diesel::select(diesel::dsl::exists(
            round_tickets::table.filter(
                round_tickets::round
                    .eq(&self.round)
                    .and(round_tickets::kind.eq(TICKET_KIND))
                    .and(round_tickets::seq.gt(self.seq)),
            ),
        ))
        .get_result::<bool>(conn)?;

        Ok(!superseded)
    }

    fn release(&self, conn: &mut SqliteConnection) -> Result<(), Error> {
        diesel::update(round_tickets::table.filter(round_tickets::id.eq(&self.id)))
            .set(round_tickets::released.eq(true))
            .execute(conn)?;
        Ok(())
    }

    /// Releases the ticket after a failed pairing. A failure to release is
    /// logged, so that the caller still sees the error which stopped the
    /// pairing.
    fn release_or_log(&self, conn: &mut SqliteConnection) {
        if let Err(e) = self.release(conn) {
            tracing::error!(
                error = %e,
                ticket = %self.id,
                "failed to release pairing ticket"
            );
        }
    }

    /// Releases this ticket along with any older ones, which were either
    /// overridden or abandoned.
    fn release_up_to(&self, conn: &mut SqliteConnection) -> Result<(), Error> {
        diesel::update(
            round_tickets::table.filter(
                round_tickets::round
                    .eq(&self.round)
                    .and(round_tickets::kind.eq(TICKET_KIND))
                    .and(round_tickets::seq.le(self.seq)),
            ),
        )
        .set(round_tickets::released.eq(true))
        .execute(conn)?;
        Ok(())
    }
}

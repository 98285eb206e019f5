//! Moving a tournament from the preliminary rounds into (and through) the
//! elimination bracket.

use diesel::SqliteConnection;

use crate::{
    Error,
    tournaments::{
        Tournament, TournamentStatus,
        config::PairingPolicy,
        rounds::{
            NewRound, Round, RoundKind, TournamentRounds,
            pairings::{Pairing, elimination::pair_elimination, write_pairing},
            trials::Trial,
        },
        standings::{Scoresheet, Standings, is_scored},
        teams::Team,
    },
};

/// Creates the next elimination round of the tournament, along with its
/// trials, and returns the created rounds.
///
/// The first call (once every preliminary round has been published and
/// scored) breaks the top `2^num_elimination_rounds` teams into a bracket.
/// Each later call advances the winners of the last elimination round, which
/// must be published and scored. Once the bracket is complete (or when the
/// tournament has no elimination rounds) nothing is created and the returned
/// list is empty.
#[tracing::instrument(skip(policy, scores, conn))]
pub fn advance_phase(
    tournament_id: &str,
    policy: &PairingPolicy,
    scores: &dyn Scoresheet,
    conn: &mut SqliteConnection,
) -> Result<Vec<Round>, Error> {
    let tournament = Tournament::fetch(tournament_id, conn)?;
    tournament.require_active()?;

    if tournament.num_elimination_rounds == 0 {
        tracing::info!("tournament has no elimination rounds");
        return Ok(vec![]);
    }

    let rounds = TournamentRounds::fetch(tournament_id, conn)?;

    let number = match rounds.last_elim() {
        None => 1,
        Some(last) if last.number >= tournament.num_elimination_rounds => {
            tracing::info!("elimination bracket is complete");
            return Ok(vec![]);
        }
        Some(last) => last.number + 1,
    };

    let pairing = pair_elimination_round(
        &tournament,
        &rounds,
        number,
        policy,
        scores,
        conn,
    )?;

    let round = conn.immediate_transaction(|conn| -> Result<Round, Error> {
        let round = Round::create(
            &NewRound {
                tournament: tournament.id.clone(),
                number,
                date: String::new(),
                kind: RoundKind::Elimination,
            },
            conn,
        )?;

        write_pairing(&round.id, &pairing, conn).map_err(Error::rolled_back)?;

        Ok(round)
    })?;

    tracing::info!(
        round = %round.id,
        number,
        trials = pairing.trials.len(),
        "created elimination round"
    );

    Ok(vec![round])
}

/// Pairs elimination round `number`.
///
/// Seeds always come from the final preliminary standings, so the bracket
/// positions are the same for every elimination round.
pub(crate) fn pair_elimination_round(
    tournament: &Tournament,
    rounds: &TournamentRounds,
    number: i64,
    policy: &PairingPolicy,
    scores: &dyn Scoresheet,
    conn: &mut SqliteConnection,
) -> Result<Pairing, Error> {
    if number < 1 || number > tournament.num_elimination_rounds {
        return Err(Error::InvalidPairingInput(format!(
            "the tournament has {} elimination rounds, so there is no \
             elimination round {number}",
            tournament.num_elimination_rounds
        )));
    }

    require_preliminaries_complete(tournament, rounds, scores, conn)?;

    let seeds = break_seeds(tournament, scores, conn)?;

    let survivors = if number == 1 {
        seeds.clone()
    } else {
        let previous = rounds
            .elim
            .iter()
            .find(|round| round.number == number - 1)
            .ok_or_else(|| {
                Error::RoundNotReady(format!(
                    "elimination round {} does not exist yet",
                    number - 1
                ))
            })?;
        winners_of(previous, &seeds, scores, conn)?
    };

    pair_elimination(&seeds, &survivors, policy.elimination_sides)
}

fn require_preliminaries_complete(
    tournament: &Tournament,
    rounds: &TournamentRounds,
    scores: &dyn Scoresheet,
    conn: &mut SqliteConnection,
) -> Result<(), Error> {
    let created = rounds.prelim.len() as i64;
    if created < tournament.num_preliminary_rounds {
        return Err(Error::RoundNotReady(format!(
            "only {created} of {} preliminary rounds have been created",
            tournament.num_preliminary_rounds
        )));
    }

    for round in &rounds.prelim {
        require_round_complete(round, scores, conn)?;
    }

    Ok(())
}

/// Checks that the round has been published and every one of its trials
/// has been scored, returning its trials.
fn require_round_complete(
    round: &Round,
    scores: &dyn Scoresheet,
    conn: &mut SqliteConnection,
) -> Result<Vec<Trial>, Error> {
    if !round.published {
        return Err(Error::RoundNotReady(format!(
            "{} round {} has not been published",
            round.kind, round.number
        )));
    }

    let trials = Trial::of_round(&round.id, conn)?;
    if !is_scored(&trials, scores) {
        return Err(Error::RoundNotReady(format!(
            "{} round {} has not been fully scored",
            round.kind, round.number
        )));
    }

    Ok(trials)
}

/// The teams which break, in seed order.
fn break_seeds(
    tournament: &Tournament,
    scores: &dyn Scoresheet,
    conn: &mut SqliteConnection,
) -> Result<Vec<Team>, Error> {
    let standings = Standings::fetch(&tournament.id, scores, conn)?;
    let needed = tournament.bracket_size();

    if standings.len() < needed {
        return Err(Error::InsufficientTeams {
            needed,
            available: standings.len(),
        });
    }

    Ok(standings.top(needed))
}

/// The winners of an elimination round, which must all be seeds.
fn winners_of(
    round: &Round,
    seeds: &[Team],
    scores: &dyn Scoresheet,
    conn: &mut SqliteConnection,
) -> Result<Vec<Team>, Error> {
    let trials = require_round_complete(round, scores, conn)?;

    trials
        .iter()
        .map(|trial| {
            let winner = scores.winner_of(&trial.id).ok_or_else(|| {
                Error::RoundNotReady(format!("trial {} has no winner", trial.id))
            })?;
            seeds
                .iter()
                .find(|seed| seed.id == winner)
                .cloned()
                .ok_or_else(|| {
                    Error::InvalidPairingInput(format!(
                        "team {winner} won trial {} but did not break",
                        trial.id
                    ))
                })
        })
        .collect()
}

/// Moves the tournament to its next status.
pub fn transition_tournament(
    tournament_id: &str,
    to: TournamentStatus,
    conn: &mut SqliteConnection,
) -> Result<Tournament, Error> {
    Tournament::transition(tournament_id, to, conn)
}

use diesel::{SqliteConnection, prelude::*};

use crate::{
    Error,
    schema::rounds,
    tournaments::{
        Tournament,
        config::PublishPolicy,
        rounds::{Round, trials::Trial},
    },
};

/// Publishes the round, making its trials visible to competitors.
///
/// Publishing a round which is already published does nothing and returns
/// it unchanged.
#[tracing::instrument(skip(policy, conn))]
pub fn publish_round(
    round_id: &str,
    policy: &PublishPolicy,
    conn: &mut SqliteConnection,
) -> Result<Round, Error> {
    conn.immediate_transaction(|conn| -> Result<Round, Error> {
        let round = Round::fetch(round_id, conn)?;
        if round.published {
            tracing::debug!("round is already published");
            return Ok(round);
        }

        Tournament::fetch(&round.tournament, conn)?.require_active()?;

        let trials = Trial::of_round(round_id, conn)?;
        if trials.is_empty() {
            return Err(Error::RoundNotReady(format!(
                "round {round_id} has not been paired"
            )));
        }

        if policy.require_courtrooms {
            let missing = trials
                .iter()
                .filter(|trial| trial.courtroom.is_none())
                .count();
            if missing > 0 {
                return Err(Error::RoundNotReady(format!(
                    "{missing} trials of round {round_id} have no courtroom"
                )));
            }
        }

        diesel::update(
            rounds::table.filter(
                rounds::id.eq(round_id).and(rounds::published.eq(false)),
            ),
        )
        .set((
            rounds::published.eq(true),
            rounds::updated.eq(diesel::dsl::now),
        ))
        .execute(conn)?;

        tracing::info!(trials = trials.len(), "published round");

        Round::fetch(round_id, conn)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::fixtures::{TournamentBuilder, courtrooms, test_conn};
    use crate::tournaments::{
        config::{CourtroomPolicy, PairingPolicy},
        rounds::{pairings::generate_pairings, room_allocator::allocate_courtrooms},
        standings::RecordedScores,
    };

    #[test]
    fn publishing_twice_changes_nothing() {
        let mut conn = test_conn();
        let setup = TournamentBuilder::new(4).prelim_rounds(1).build(&mut conn);
        let round_id = &setup.rounds[0].id;

        generate_pairings(
            round_id,
            &PairingPolicy::default(),
            &RecordedScores::default(),
            false,
            &mut conn,
        )
        .unwrap();

        let first =
            publish_round(round_id, &PublishPolicy::default(), &mut conn)
                .unwrap();
        assert!(first.published);

        let second =
            publish_round(round_id, &PublishPolicy::default(), &mut conn)
                .unwrap();
        assert!(second.published);
        assert_eq!(first.updated, second.updated);
        assert_eq!(Trial::of_round(round_id, &mut conn).unwrap().len(), 2);
    }

    #[test]
    fn unpaired_round_cannot_be_published() {
        let mut conn = test_conn();
        let setup = TournamentBuilder::new(4).prelim_rounds(1).build(&mut conn);

        let err = publish_round(
            &setup.rounds[0].id,
            &PublishPolicy::default(),
            &mut conn,
        )
        .unwrap_err();
        assert!(matches!(err, Error::RoundNotReady(_)));
        assert!(!Round::fetch(&setup.rounds[0].id, &mut conn).unwrap().published);
    }

    #[test]
    fn courtrooms_can_be_required() {
        let mut conn = test_conn();
        let setup = TournamentBuilder::new(4).prelim_rounds(1).build(&mut conn);
        let round_id = &setup.rounds[0].id;
        let policy = PublishPolicy {
            require_courtrooms: true,
        };

        generate_pairings(
            round_id,
            &PairingPolicy::default(),
            &RecordedScores::default(),
            false,
            &mut conn,
        )
        .unwrap();

        let err = publish_round(round_id, &policy, &mut conn).unwrap_err();
        assert!(matches!(err, Error::RoundNotReady(_)));

        courtrooms(2, &mut conn);
        allocate_courtrooms(round_id, &CourtroomPolicy::default(), &mut conn)
            .unwrap();

        assert!(publish_round(round_id, &policy, &mut conn).unwrap().published);
    }
}

//! Assigns courtrooms to the trials of a round.

use std::collections::{HashMap, HashSet};

use diesel::{SqliteConnection, prelude::*};

use crate::{
    Error,
    schema::{schools, teams, trials},
    tournaments::{
        config::{CourtroomPolicy, Locality},
        courtrooms::Courtroom,
        rounds::{Round, trials::Trial},
    },
};

/// Gives every trial of the round which does not have a courtroom yet one of
/// the free courtrooms, and returns all of the round's trials.
///
/// Trials are handled in the order they were created and take the first
/// suitable courtroom in name order. Courtrooms already used by the round
/// are not handed out again. If there are fewer free courtrooms than trials
/// needing one, nothing is assigned.
#[tracing::instrument(skip(policy, conn))]
pub fn allocate_courtrooms(
    round_id: &str,
    policy: &CourtroomPolicy,
    conn: &mut SqliteConnection,
) -> Result<Vec<Trial>, Error> {
    let round = Round::fetch(round_id, conn)?;

    conn.immediate_transaction(|conn| -> Result<Vec<Trial>, Error> {
        let trials = Trial::of_round(&round.id, conn)?;

        let taken = trials
            .iter()
            .filter_map(|trial| trial.courtroom.as_deref())
            .collect::<HashSet<_>>();
        let unassigned = trials
            .iter()
            .filter(|trial| trial.courtroom.is_none())
            .collect::<Vec<_>>();

        if unassigned.is_empty() {
            tracing::debug!("every trial already has a courtroom");
            return Ok(trials.clone());
        }

        let free = Courtroom::list(conn)?
            .into_iter()
            .filter(|courtroom| !taken.contains(courtroom.id.as_str()))
            .collect::<Vec<_>>();

        if free.len() < unassigned.len() {
            return Err(Error::InsufficientCapacity {
                needed: unassigned.len(),
                available: free.len(),
            });
        }

        let districts = match policy.locality {
            Locality::None => HashMap::new(),
            Locality::SchoolDistrict => team_districts(&round.tournament, conn)?,
        };

        let assignments = assign(&unassigned, free, &districts);

        (|| -> Result<Vec<Trial>, Error> {
            for (trial_id, courtroom_id) in &assignments {
                diesel::update(trials::table.filter(trials::id.eq(trial_id)))
                    .set((
                        trials::courtroom.eq(courtroom_id),
                        trials::updated.eq(diesel::dsl::now),
                    ))
                    .execute(conn)?;
            }
            Trial::of_round(&round.id, conn)
        })()
        .map_err(Error::rolled_back)
        .inspect(|_| {
            tracing::info!(assigned = assignments.len(), "allocated courtrooms")
        })
    })
}

/// Map from team id to the district of the team's school.
fn team_districts(
    tournament_id: &str,
    conn: &mut SqliteConnection,
) -> Result<HashMap<String, String>, Error> {
    Ok(teams::table
        .inner_join(schools::table)
        .filter(teams::tournament.eq(tournament_id))
        .select((teams::id, schools::district))
        .load::<(String, String)>(conn)?
        .into_iter()
        .filter(|(_, district)| !district.is_empty())
        .collect())
}

/// Pairs each trial with a courtroom, as `(trial id, courtroom id)`.
///
/// `free` must be in preference order and hold at least one courtroom per
/// trial.
fn assign(
    trials: &[&Trial],
    mut free: Vec<Courtroom>,
    districts: &HashMap<String, String>,
) -> Vec<(String, String)> {
    let mut assignments = Vec::with_capacity(trials.len());

    for trial in trials {
        let local = [&trial.prosecution_team, &trial.defense_team]
            .into_iter()
            .filter_map(|team| districts.get(team.as_str()))
            .collect::<Vec<_>>();

        let idx = free
            .iter()
            .position(|courtroom| local.contains(&&courtroom.location))
            .unwrap_or(0);

        if idx >= free.len() {
            break;
        }
        let courtroom = free.remove(idx);
        assignments.push((trial.id.clone(), courtroom.id));
    }

    assignments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::fixtures::{
        TournamentBuilder, courtroom, courtrooms, test_conn, trial,
    };
    use crate::tournaments::{
        config::PairingPolicy, rounds::pairings::generate_pairings,
        standings::RecordedScores,
    };

    fn paired_round(
        teams: usize,
        conn: &mut SqliteConnection,
    ) -> crate::test::fixtures::Setup {
        let setup = TournamentBuilder::new(teams).prelim_rounds(1).build(conn);
        generate_pairings(
            &setup.rounds[0].id,
            &PairingPolicy::default(),
            &RecordedScores::default(),
            false,
            conn,
        )
        .unwrap();
        setup
    }

    #[test]
    fn assigns_distinct_courtrooms_in_name_order() {
        let mut conn = test_conn();
        let setup = paired_round(6, &mut conn);
        let rooms = courtrooms(4, &mut conn);

        let trials = allocate_courtrooms(
            &setup.rounds[0].id,
            &CourtroomPolicy::default(),
            &mut conn,
        )
        .unwrap();

        let assigned = trials
            .iter()
            .map(|trial| trial.courtroom.clone().unwrap())
            .collect::<Vec<_>>();
        let expected = rooms
            .iter()
            .take(3)
            .map(|room| room.id.clone())
            .collect::<Vec<_>>();
        assert_eq!(assigned, expected);
    }

    #[test]
    fn too_few_courtrooms_assigns_nothing() {
        let mut conn = test_conn();
        let setup = paired_round(6, &mut conn);
        courtrooms(2, &mut conn);

        let err = allocate_courtrooms(
            &setup.rounds[0].id,
            &CourtroomPolicy::default(),
            &mut conn,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientCapacity {
                needed: 3,
                available: 2
            }
        ));
        assert!(err.wrote_nothing());

        let trials = Trial::of_round(&setup.rounds[0].id, &mut conn).unwrap();
        assert!(trials.iter().all(|trial| trial.courtroom.is_none()));
    }

    #[test]
    fn existing_assignments_are_kept() {
        let mut conn = test_conn();
        let setup = paired_round(4, &mut conn);
        let rooms = courtrooms(2, &mut conn);
        let round_id = &setup.rounds[0].id;

        let before = Trial::of_round(round_id, &mut conn).unwrap();
        // the second trial already sits in the first courtroom
        diesel::update(trials::table.filter(trials::id.eq(&before[1].id)))
            .set(trials::courtroom.eq(&rooms[0].id))
            .execute(&mut conn)
            .unwrap();

        let after =
            allocate_courtrooms(round_id, &CourtroomPolicy::default(), &mut conn)
                .unwrap();
        assert_eq!(after[0].courtroom.as_deref(), Some(rooms[1].id.as_str()));
        assert_eq!(after[1].courtroom.as_deref(), Some(rooms[0].id.as_str()));

        // running again is a no-op
        let again =
            allocate_courtrooms(round_id, &CourtroomPolicy::default(), &mut conn)
                .unwrap();
        assert_eq!(again, after);
    }

    #[test]
    fn prefers_courtrooms_in_a_teams_district() {
        let trials = vec![trial("r1", "t1", "t2"), trial("r1", "t3", "t4")];
        let trials = trials.iter().collect::<Vec<_>>();
        let free = vec![
            courtroom("a", "Courtroom A", "North"),
            courtroom("b", "Courtroom B", "South"),
            courtroom("c", "Courtroom C", ""),
        ];
        let districts = [("t1", "West"), ("t2", "South"), ("t3", "North")]
            .into_iter()
            .map(|(team, district)| (team.to_string(), district.to_string()))
            .collect::<HashMap<_, _>>();

        let assignments = assign(&trials, free.clone(), &districts);
        assert_eq!(
            assignments,
            vec![
                (trials[0].id.clone(), "b".to_string()),
                (trials[1].id.clone(), "a".to_string()),
            ]
        );

        // without districts, the order of the list wins
        let assignments = assign(&trials, free, &HashMap::new());
        assert_eq!(assignments[0].1, "a");
        assert_eq!(assignments[1].1, "b");
    }

    #[test]
    fn school_district_locality_end_to_end() {
        let mut conn = test_conn();
        let setup = paired_round(2, &mut conn);
        // the builder puts team 1 in the North district school
        Courtroom::create("Courtroom A", "Elsewhere", &mut conn).unwrap();
        let north = Courtroom::create("Courtroom B", "North", &mut conn).unwrap();

        let trials = allocate_courtrooms(
            &setup.rounds[0].id,
            &CourtroomPolicy {
                locality: Locality::SchoolDistrict,
            },
            &mut conn,
        )
        .unwrap();
        assert_eq!(trials[0].courtroom.as_deref(), Some(north.id.as_str()));
    }
}

//! Runs whole tournaments through the [`Engine`], checking the pairing,
//! allocation and progression invariants after every step.
//!
//! Results are made up with a seeded RNG, so a workload always plays out the
//! same way.

use std::{
    collections::HashSet,
    sync::{Arc, RwLock},
};

use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::{
    config::Config,
    engine::Engine,
    test::fixtures::{Setup, TournamentBuilder, courtrooms, test_pool},
    tournaments::{
        TournamentStatus,
        rounds::{Round, RoundKind, pairings::UnresolvableConstraint, trials::Trial},
        standings::{RecordedScores, Scoresheet, TeamRecord},
    },
};

/// Results which are filled in while the tournament runs.
#[derive(Default)]
struct LiveScores(RwLock<RecordedScores>);

impl LiveScores {
    fn record(&self, trial: &Trial, prosecution_wins: bool, points: Decimal) {
        let mut scores = self.0.write().unwrap();
        let (winner, loser) = if prosecution_wins {
            (&trial.prosecution_team, &trial.defense_team)
        } else {
            (&trial.defense_team, &trial.prosecution_team)
        };
        scores.winners.insert(trial.id.clone(), winner.clone());

        let record = scores.records.entry(winner.clone()).or_default();
        record.wins += 1;
        record.tiebreak += points;
        scores.records.entry(loser.clone()).or_default().losses += 1;
    }

    fn record_elimination(&self, trial: &Trial, prosecution_wins: bool) {
        let winner = if prosecution_wins {
            &trial.prosecution_team
        } else {
            &trial.defense_team
        };
        self.0
            .write()
            .unwrap()
            .winners
            .insert(trial.id.clone(), winner.clone());
    }
}

impl Scoresheet for LiveScores {
    fn record_of(&self, team_id: &str) -> Option<TeamRecord> {
        self.0.read().unwrap().record_of(team_id)
    }

    fn winner_of(&self, trial_id: &str) -> Option<String> {
        self.0.read().unwrap().winner_of(trial_id)
    }
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct Workload {
    pub teams: usize,
    pub prelim_rounds: i64,
    pub elim_rounds: i64,
    pub courtrooms: usize,
    pub seed: u64,
    #[serde(default)]
    pub config: Config,
}

pub struct Outcome {
    pub setup: Setup,
    pub elim_rounds: Vec<Round>,
    pub warnings: Vec<UnresolvableConstraint>,
}

impl Workload {
    pub async fn run(&self) -> Outcome {
        let span = tracing::span!(
            tracing::Level::INFO,
            "workload_run",
            teams = self.teams,
            num_rounds = self.prelim_rounds
        );
        let _guard = span.enter();

        let scores = Arc::new(LiveScores::default());
        let engine =
            Engine::new(test_pool(), self.config.clone(), scores.clone());
        let mut rng = rand_chacha::ChaCha20Rng::seed_from_u64(self.seed);

        let (teams, prelim_rounds, elim_rounds, n_courtrooms) = (
            self.teams,
            self.prelim_rounds,
            self.elim_rounds,
            self.courtrooms,
        );
        let setup = engine
            .with_conn(move |conn| {
                let setup = TournamentBuilder::new(teams)
                    .prelim_rounds(prelim_rounds)
                    .elim_rounds(elim_rounds)
                    .build(conn);
                courtrooms(n_courtrooms, conn);
                Ok(setup)
            })
            .await
            .unwrap();

        let mut warnings = Vec::new();

        for round in &setup.rounds {
            let generated =
                engine.generate_pairings(&round.id, false).await.unwrap();
            check_pairing(&setup, &generated.trials, generated.byes.len());
            warnings.extend(generated.warnings);

            let trials = engine.allocate_courtrooms(&round.id).await.unwrap();
            check_courtrooms(&trials);

            let published = engine.publish_round(&round.id).await.unwrap();
            assert!(published.published);

            for trial in &trials {
                let points = Decimal::from(rng.random_range(50..100i64));
                scores.record(trial, rng.random_bool(0.5), points);
            }
        }

        let mut elim_rounds = Vec::new();
        loop {
            let created = engine
                .advance_tournament_phase(&setup.tournament.id)
                .await
                .unwrap();
            let Some(round) = created.into_iter().next() else {
                break;
            };
            assert_eq!(round.kind, RoundKind::Elimination);

            let round_id = round.id.clone();
            let trials = engine
                .with_conn(move |conn| Trial::of_round(&round_id, conn))
                .await
                .unwrap();
            assert!(trials.iter().all(|trial| trial.courtroom.is_none()));

            let trials = engine.allocate_courtrooms(&round.id).await.unwrap();
            check_courtrooms(&trials);
            engine.publish_round(&round.id).await.unwrap();

            for trial in &trials {
                scores.record_elimination(trial, rng.random_bool(0.5));
            }
            elim_rounds.push(round);
        }

        engine
            .transition_tournament(
                &setup.tournament.id,
                TournamentStatus::Completed,
            )
            .await
            .unwrap();

        Outcome {
            setup,
            elim_rounds,
            warnings,
        }
    }
}

fn check_pairing(setup: &Setup, trials: &[Trial], byes: usize) {
    assert_eq!(trials.len() * 2 + byes, setup.teams.len());

    let mut seen = HashSet::new();
    for trial in trials {
        assert_ne!(trial.prosecution_team, trial.defense_team);
        assert!(seen.insert(&trial.prosecution_team));
        assert!(seen.insert(&trial.defense_team));
    }
}

fn check_courtrooms(trials: &[Trial]) {
    let rooms = trials
        .iter()
        .map(|trial| trial.courtroom.as_deref().unwrap())
        .collect::<HashSet<_>>();
    assert_eq!(rooms.len(), trials.len());
}

#[cfg(test)]
pub mod regressions {
    use super::*;

    #[tokio::test]
    async fn sixteen_teams_break_to_four() {
        let workload = Workload {
            teams: 16,
            prelim_rounds: 3,
            elim_rounds: 2,
            courtrooms: 8,
            seed: 1,
            config: Config::default(),
        };

        let outcome = workload.run().await;
        assert_eq!(outcome.elim_rounds.len(), 2);
        assert_eq!(outcome.elim_rounds[0].number, 1);
        assert_eq!(outcome.elim_rounds[1].number, 2);
    }

    #[tokio::test]
    async fn odd_field_with_byes() {
        let workload: Workload =
            serde_json::from_str(include_str!("tournament_regressions/r1.json"))
                .unwrap();

        let outcome = workload.run().await;

        let byes = outcome
            .warnings
            .iter()
            .filter_map(|warning| match warning {
                UnresolvableConstraint::Bye { team } => Some(team.clone()),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(byes.len(), 3);
        // nobody sits out twice while others have not sat out at all
        assert_eq!(byes.iter().collect::<HashSet<_>>().len(), 3);
        assert_eq!(outcome.elim_rounds.len(), 1);
    }

    #[tokio::test]
    async fn no_elimination_rounds() {
        let workload = Workload {
            teams: 6,
            prelim_rounds: 2,
            elim_rounds: 0,
            courtrooms: 3,
            seed: 9,
            config: Config::default(),
        };

        let outcome = workload.run().await;
        assert!(outcome.elim_rounds.is_empty());
        assert_eq!(outcome.setup.teams.len(), 6);
    }
}

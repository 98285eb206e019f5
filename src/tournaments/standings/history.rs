use std::collections::HashMap;

use diesel::SqliteConnection;

use crate::{
    Error,
    tournaments::rounds::{
        Round, TournamentRounds,
        trials::{Bye, Side, Trial},
    },
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Appearance {
    pub round_number: i64,
    pub side: Side,
    pub opponent: String,
}

/// What each team has done in the preliminary rounds before a given round:
/// which side it argued, whom it faced and when it had a bye.
#[derive(Clone, Debug, Default)]
pub struct TeamHistory {
    appearances: HashMap<String, Vec<Appearance>>,
    byes: HashMap<String, Vec<i64>>,
}

impl TeamHistory {
    /// Loads the history from every preliminary round of the tournament
    /// numbered below `round_number`.
    #[tracing::instrument(skip(conn))]
    pub fn fetch(
        tournament_id: &str,
        round_number: i64,
        conn: &mut SqliteConnection,
    ) -> Result<Self, Error> {
        let rounds = TournamentRounds::fetch(tournament_id, conn)?;
        let prior = rounds.prelims_before(round_number).cloned().collect::<Vec<_>>();
        let round_ids = prior.iter().map(|r| r.id.clone()).collect::<Vec<_>>();

        let trials = Trial::of_rounds(&round_ids, conn)?;
        let byes = Bye::of_rounds(&round_ids, conn)?;

        Ok(Self::from_records(&prior, &trials, &byes))
    }

    pub fn from_records(rounds: &[Round], trials: &[Trial], byes: &[Bye]) -> Self {
        let number_of = rounds
            .iter()
            .map(|round| (round.id.as_str(), round.number))
            .collect::<HashMap<_, _>>();

        let mut history = TeamHistory::default();

        for trial in trials {
            let Some(&round_number) = number_of.get(trial.round.as_str()) else {
                continue;
            };

            history
                .appearances
                .entry(trial.prosecution_team.clone())
                .or_default()
                .push(Appearance {
                    round_number,
                    side: Side::Prosecution,
                    opponent: trial.defense_team.clone(),
                });
            history
                .appearances
                .entry(trial.defense_team.clone())
                .or_default()
                .push(Appearance {
                    round_number,
                    side: Side::Defense,
                    opponent: trial.prosecution_team.clone(),
                });
        }

        for bye in byes {
            if let Some(&round_number) = number_of.get(bye.round.as_str()) {
                history
                    .byes
                    .entry(bye.team.clone())
                    .or_default()
                    .push(round_number);
            }
        }

        for appearances in history.appearances.values_mut() {
            appearances.sort_by_key(|appearance| appearance.round_number);
        }

        history
    }

    pub fn appearances(&self, team_id: &str) -> &[Appearance] {
        self.appearances
            .get(team_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// The side the team argued in round `round_number - 1`, if it competed
    /// in that round.
    pub fn side_before(&self, team_id: &str, round_number: i64) -> Option<Side> {
        self.appearances(team_id)
            .iter()
            .rev()
            .find(|appearance| appearance.round_number == round_number - 1)
            .map(|appearance| appearance.side)
    }

    pub fn have_met(&self, a: &str, b: &str) -> bool {
        self.appearances(a)
            .iter()
            .any(|appearance| appearance.opponent == b)
    }

    /// Number of times the team has argued each side, as
    /// `(prosecution, defense)`.
    pub fn side_counts(&self, team_id: &str) -> (usize, usize) {
        self.appearances(team_id).iter().fold(
            (0, 0),
            |(prosecution, defense), appearance| match appearance.side {
                Side::Prosecution => (prosecution + 1, defense),
                Side::Defense => (prosecution, defense + 1),
            },
        )
    }

    pub fn bye_count(&self, team_id: &str) -> usize {
        self.byes.get(team_id).map(Vec::len).unwrap_or(0)
    }

    /// Whether any preliminary rounds have been paired before.
    pub fn is_empty(&self) -> bool {
        self.appearances.is_empty() && self.byes.is_empty()
    }
}

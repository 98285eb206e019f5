use std::collections::HashMap;

use diesel::SqliteConnection;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    Error,
    tournaments::{rounds::trials::Trial, teams::Team},
};

pub mod history;

/// The cumulative preliminary record of a team.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TeamRecord {
    pub wins: u32,
    #[serde(default)]
    pub losses: u32,
    /// Secondary ranking value (typically cumulative ballot points). Higher
    /// is better.
    #[serde(default)]
    pub tiebreak: Decimal,
}

/// Read access to results, which are recorded outside of this crate.
pub trait Scoresheet: Send + Sync {
    /// The team's record over the preliminary rounds scored so far.
    fn record_of(&self, team_id: &str) -> Option<TeamRecord>;

    /// The id of the team which won the trial, once it has been scored.
    fn winner_of(&self, trial_id: &str) -> Option<String>;
}

/// A [`Scoresheet`] held in memory, for example loaded from a JSON export.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct RecordedScores {
    #[serde(default)]
    pub records: HashMap<String, TeamRecord>,
    /// Map from trial ids to the id of the winning team.
    #[serde(default)]
    pub winners: HashMap<String, String>,
}

impl Scoresheet for RecordedScores {
    fn record_of(&self, team_id: &str) -> Option<TeamRecord> {
        self.records.get(team_id).copied()
    }

    fn winner_of(&self, trial_id: &str) -> Option<String> {
        self.winners.get(trial_id).cloned()
    }
}

/// A round is scored once every one of its trials has a winner, and that
/// winner is one of the two teams in the trial.
pub fn is_scored(trials: &[Trial], scores: &dyn Scoresheet) -> bool {
    trials.iter().all(|trial| {
        scores
            .winner_of(&trial.id)
            .is_some_and(|winner| trial.involves(&winner))
    })
}

#[derive(Serialize, Clone, Debug)]
pub struct RankedTeam {
    pub team: Team,
    pub record: TeamRecord,
}

/// Teams of a tournament, best first.
#[derive(Serialize, Clone, Debug)]
pub struct Standings {
    pub ranked: Vec<RankedTeam>,
}

impl Standings {
    /// Orders teams by wins, then tiebreak (both descending), then by team
    /// number so that the order is always reproducible.
    pub fn compute(teams: Vec<Team>, scores: &dyn Scoresheet) -> Self {
        let mut ranked = teams
            .into_iter()
            .map(|team| {
                let record = scores.record_of(&team.id).unwrap_or_default();
                RankedTeam { team, record }
            })
            .collect::<Vec<_>>();

        ranked.sort_by(|a, b| {
            b.record
                .wins
                .cmp(&a.record.wins)
                .then_with(|| b.record.tiebreak.cmp(&a.record.tiebreak))
                .then_with(|| a.team.team_number.cmp(&b.team.team_number))
                .then_with(|| a.team.id.cmp(&b.team.id))
        });

        Self { ranked }
    }

    #[tracing::instrument(skip(scores, conn))]
    pub fn fetch(
        tournament_id: &str,
        scores: &dyn Scoresheet,
        conn: &mut SqliteConnection,
    ) -> Result<Self, Error> {
        let teams = Team::of_tournament(tournament_id, conn)?;
        Ok(Self::compute(teams, scores))
    }

    pub fn rank_of(&self, team_id: &str) -> Option<usize> {
        self.ranked.iter().position(|ranked| ranked.team.id == team_id)
    }

    pub fn record_of(&self, team_id: &str) -> TeamRecord {
        self.ranked
            .iter()
            .find(|ranked| ranked.team.id == team_id)
            .map(|ranked| ranked.record)
            .unwrap_or_default()
    }

    /// The `n` best teams, in seed order.
    pub fn top(&self, n: usize) -> Vec<Team> {
        self.ranked
            .iter()
            .take(n)
            .map(|ranked| ranked.team.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.ranked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }
}

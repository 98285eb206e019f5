use chrono::NaiveDateTime;
use diesel::{SqliteConnection, prelude::*, sqlite::Sqlite};
use serde::{Deserialize, Serialize};

use crate::{
    Error,
    schema::{round_byes, trials},
};

/// One trial of a round: a prosecution team against a defense team, possibly
/// in a courtroom.
#[derive(
    Queryable, Selectable, Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
)]
#[diesel(table_name = trials)]
#[diesel(check_for_backend(Sqlite))]
pub struct Trial {
    pub id: String,
    pub round: String,
    pub prosecution_team: String,
    pub defense_team: String,
    pub courtroom: Option<String>,
    pub created: NaiveDateTime,
    pub updated: NaiveDateTime,
}

impl Trial {
    /// Trials of the round, in creation order.
    pub fn of_round(
        round_id: &str,
        conn: &mut SqliteConnection,
    ) -> Result<Vec<Trial>, Error> {
        Ok(trials::table
            .filter(trials::round.eq(round_id))
            // trials written together carry strictly increasing timestamps
            .order_by((trials::created.asc(), trials::id.asc()))
            .select(Trial::as_select())
            .load(conn)?)
    }

    pub fn of_rounds(
        round_ids: &[String],
        conn: &mut SqliteConnection,
    ) -> Result<Vec<Trial>, Error> {
        Ok(trials::table
            .filter(trials::round.eq_any(round_ids))
            .order_by((trials::created.asc(), trials::id.asc()))
            .select(Trial::as_select())
            .load(conn)?)
    }

    pub fn involves(&self, team_id: &str) -> bool {
        self.prosecution_team == team_id || self.defense_team == team_id
    }
}

/// Records that a team sat out a round because of an odd team count.
#[derive(
    Queryable, Selectable, Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
)]
#[diesel(table_name = round_byes)]
#[diesel(check_for_backend(Sqlite))]
pub struct Bye {
    pub id: String,
    pub round: String,
    pub team: String,
    pub created: NaiveDateTime,
}

impl Bye {
    pub fn of_round(
        round_id: &str,
        conn: &mut SqliteConnection,
    ) -> Result<Vec<Bye>, Error> {
        Ok(round_byes::table
            .filter(round_byes::round.eq(round_id))
            .select(Bye::as_select())
            .load(conn)?)
    }

    pub fn of_rounds(
        round_ids: &[String],
        conn: &mut SqliteConnection,
    ) -> Result<Vec<Bye>, Error> {
        Ok(round_byes::table
            .filter(round_byes::round.eq_any(round_ids))
            .select(Bye::as_select())
            .load(conn)?)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Prosecution,
    Defense,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Side::Prosecution => "prosecution",
            Side::Defense => "defense",
        })
    }
}

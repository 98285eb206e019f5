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
    schema::{self, round_byes, round_tickets, rounds},
    store::new_id,
    tournaments::Tournament,
    validation,
};

pub mod pairings;
pub mod publish;
pub mod room_allocator;
pub mod trials;

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
pub enum RoundKind {
    Preliminary,
    Elimination,
}

impl RoundKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoundKind::Preliminary => "preliminary",
            RoundKind::Elimination => "elimination",
        }
    }
}

impl std::fmt::Display for RoundKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoundKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "preliminary" => Ok(RoundKind::Preliminary),
            "elimination" => Ok(RoundKind::Elimination),
            other => Err(format!("unknown round type `{other}`")),
        }
    }
}

impl ToSql<Text, Sqlite> for RoundKind {
    fn to_sql<'b>(
        &'b self,
        out: &mut Output<'b, '_, Sqlite>,
    ) -> serialize::Result {
        out.set_value(self.as_str());
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Sqlite> for RoundKind {
    fn from_sql(
        bytes: <Sqlite as Backend>::RawValue<'_>,
    ) -> deserialize::Result<Self> {
        let text = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
        Ok(text.parse()?)
    }
}

#[derive(Queryable, Selectable, Serialize, Deserialize, Clone, Debug)]
#[diesel(table_name = rounds)]
#[diesel(check_for_backend(Sqlite))]
pub struct Round {
    pub id: String,
    pub number: i64,
    pub date: String,
    #[serde(rename = "type")]
    pub kind: RoundKind,
    pub published: bool,
    pub tournament: String,
    pub created: NaiveDateTime,
    pub updated: NaiveDateTime,
}

#[derive(Deserialize, Clone, Debug)]
pub struct NewRound {
    pub tournament: String,
    pub number: i64,
    #[serde(default)]
    pub date: String,
    #[serde(rename = "type")]
    pub kind: RoundKind,
}

impl Round {
    #[tracing::instrument(skip(conn))]
    pub fn fetch(
        round_id: &str,
        conn: &mut SqliteConnection,
    ) -> Result<Self, Error> {
        rounds::table
            .filter(rounds::id.eq(round_id))
            .select(Round::as_select())
            .first(conn)
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("round {round_id}")))
    }

    pub fn of_number(
        tournament_id: &str,
        kind: RoundKind,
        number: i64,
        conn: &mut SqliteConnection,
    ) -> Result<Option<Self>, Error> {
        Ok(rounds::table
            .filter(
                rounds::tournament
                    .eq(tournament_id)
                    .and(rounds::kind.eq(kind))
                    .and(rounds::number.eq(number)),
            )
            .select(Round::as_select())
            .first(conn)
            .optional()?)
    }

    /// Creates an unpublished round.
    ///
    /// Preliminary rounds must all come before the elimination rounds, so a
    /// preliminary round cannot be added once the tournament has broken.
    #[tracing::instrument(skip(conn))]
    pub fn create(
        new: &NewRound,
        conn: &mut SqliteConnection,
    ) -> Result<Round, Error> {
        validation::max_len("date", &new.date, 100)?;
        if new.number < 1 {
            return Err(Error::ValidationFailed(
                "`number` must be at least 1".to_string(),
            ));
        }
        Tournament::fetch(&new.tournament, conn)?;

        if new.kind == RoundKind::Preliminary {
            let broken = diesel::select(diesel::dsl::exists(
                rounds::table.filter(
                    rounds::tournament
                        .eq(&new.tournament)
                        .and(rounds::kind.eq(RoundKind::Elimination)),
                ),
            ))
            .get_result::<bool>(conn)?;

            if broken {
                return Err(Error::ValidationFailed(
                    "preliminary rounds cannot be added after the \
                     elimination rounds have started"
                        .to_string(),
                ));
            }
        }

        if Round::of_number(&new.tournament, new.kind, new.number, conn)?
            .is_some()
        {
            return Err(Error::ValidationFailed(format!(
                "{} round {} already exists",
                new.kind, new.number
            )));
        }

        let id = new_id();
        diesel::insert_into(rounds::table)
            .values((
                rounds::id.eq(&id),
                rounds::number.eq(new.number),
                rounds::date.eq(&new.date),
                rounds::kind.eq(new.kind),
                rounds::published.eq(false),
                rounds::tournament.eq(&new.tournament),
            ))
            .execute(conn)?;

        tracing::info!(round = %id, kind = %new.kind, number = new.number, "created round");

        Round::fetch(&id, conn)
    }

    pub fn set_date(
        &self,
        date: &str,
        conn: &mut SqliteConnection,
    ) -> Result<Round, Error> {
        validation::max_len("date", date, 100)?;

        diesel::update(rounds::table.filter(rounds::id.eq(&self.id)))
            .set((rounds::date.eq(date), rounds::updated.eq(diesel::dsl::now)))
            .execute(conn)?;

        Round::fetch(&self.id, conn)
    }

    /// Deletes the round along with its trials, byes and pairing tickets.
    #[tracing::instrument(skip(conn))]
    pub fn delete(
        round_id: &str,
        conn: &mut SqliteConnection,
    ) -> Result<(), Error> {
        Round::fetch(round_id, conn)?;

        conn.transaction(|conn| -> Result<(), Error> {
            diesel::delete(
                schema::trials::table.filter(schema::trials::round.eq(round_id)),
            )
            .execute(conn)?;
            diesel::delete(
                round_byes::table.filter(round_byes::round.eq(round_id)),
            )
            .execute(conn)?;
            diesel::delete(
                round_tickets::table.filter(round_tickets::round.eq(round_id)),
            )
            .execute(conn)?;
            diesel::delete(rounds::table.filter(rounds::id.eq(round_id)))
                .execute(conn)?;
            Ok(())
        })
        .map_err(Error::rolled_back)
    }

    pub fn is_preliminary(&self) -> bool {
        self.kind == RoundKind::Preliminary
    }
}

/// The rounds of a tournament, split into the preliminary and elimination
/// phases, each in `number` order.
#[derive(Clone, Debug)]
pub struct TournamentRounds {
    pub prelim: Vec<Round>,
    pub elim: Vec<Round>,
}

impl TournamentRounds {
    pub fn fetch(
        tournament_id: &str,
        conn: &mut SqliteConnection,
    ) -> Result<TournamentRounds, Error> {
        let rounds = rounds::table
            .filter(rounds::tournament.eq(tournament_id))
            .order_by(rounds::number.asc())
            .select(Round::as_select())
            .load(conn)?;

        let (prelim, elim): (Vec<_>, Vec<_>) =
            rounds.into_iter().partition(Round::is_preliminary);

        let ret = TournamentRounds { prelim, elim };

        // elimination rounds can only be created once the preliminary rounds
        // exist, so their creation times must be ordered the same way
        if let (Some(last_prelim), Some(first_elim)) =
            (ret.prelim.iter().map(|r| r.created).max(), ret.elim.first())
            && first_elim.created < last_prelim
        {
            tracing::warn!(
                tournament = tournament_id,
                "elimination round created before a preliminary round"
            );
        }

        Ok(ret)
    }

    /// The preliminary rounds numbered strictly below `number`.
    pub fn prelims_before(&self, number: i64) -> impl Iterator<Item = &Round> {
        self.prelim.iter().filter(move |round| round.number < number)
    }

    pub fn last_elim(&self) -> Option<&Round> {
        self.elim.last()
    }
}

use chrono::NaiveDateTime;
use diesel::{SqliteConnection, prelude::*, sqlite::Sqlite};
use serde::{Deserialize, Serialize};

use crate::{
    Error,
    schema::{round_byes, teams, trials},
    store::new_id,
    tournaments::{Tournament, schools::School},
    validation,
};

#[derive(
    Queryable, Selectable, Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
)]
#[diesel(table_name = teams)]
#[diesel(check_for_backend(Sqlite))]
pub struct Team {
    pub id: String,
    pub tournament: String,
    pub school: String,
    pub team_number: i64,
    pub name: String,
    pub created: NaiveDateTime,
    pub updated: NaiveDateTime,
}

#[derive(Deserialize, Clone, Debug)]
pub struct NewTeam {
    pub tournament: String,
    pub school: String,
    /// When unset, the team receives the next free number in its
    /// tournament.
    pub team_number: Option<i64>,
    #[serde(default)]
    pub name: String,
}

#[derive(AsChangeset, Deserialize, Default, Clone, Debug)]
#[diesel(table_name = teams)]
pub struct TeamChanges {
    pub team_number: Option<i64>,
    pub name: Option<String>,
}

impl Team {
    #[tracing::instrument(skip(conn))]
    pub fn fetch(
        team_id: &str,
        conn: &mut SqliteConnection,
    ) -> Result<Team, Error> {
        let ret = teams::table
            .filter(teams::id.eq(team_id))
            .select(Team::as_select())
            .first(conn)
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("team {team_id}")));

        tracing::trace!("ok? {}", ret.is_ok());

        ret
    }

    /// Teams of the tournament in `team_number` order.
    pub fn of_tournament(
        tournament_id: &str,
        conn: &mut SqliteConnection,
    ) -> Result<Vec<Team>, Error> {
        Ok(teams::table
            .filter(teams::tournament.eq(tournament_id))
            .order_by((teams::team_number.asc(), teams::id.asc()))
            .select(Team::as_select())
            .load(conn)?)
    }

    #[tracing::instrument(skip(conn))]
    pub fn create(
        new: &NewTeam,
        conn: &mut SqliteConnection,
    ) -> Result<Team, Error> {
        validation::max_len("name", &new.name, 200)?;
        Tournament::fetch(&new.tournament, conn)?;
        School::fetch(&new.school, conn)?;

        let team_number = match new.team_number {
            Some(number) => number,
            None => {
                teams::table
                    .filter(teams::tournament.eq(&new.tournament))
                    .select(diesel::dsl::max(teams::team_number))
                    .get_result::<Option<i64>>(conn)?
                    .unwrap_or(0)
                    + 1
            }
        };

        let id = new_id();
        diesel::insert_into(teams::table)
            .values((
                teams::id.eq(&id),
                teams::tournament.eq(&new.tournament),
                teams::school.eq(&new.school),
                teams::team_number.eq(team_number),
                teams::name.eq(&new.name),
            ))
            .execute(conn)?;

        tracing::info!(team = %id, team_number, "created team");

        Team::fetch(&id, conn)
    }

    pub fn update(
        &self,
        changes: &TeamChanges,
        conn: &mut SqliteConnection,
    ) -> Result<Team, Error> {
        if let Some(name) = &changes.name {
            validation::max_len("name", name, 200)?;
        }

        diesel::update(teams::table.filter(teams::id.eq(&self.id)))
            .set((changes, teams::updated.eq(diesel::dsl::now)))
            .execute(conn)?;

        Team::fetch(&self.id, conn)
    }

    /// Deletes a team which has not yet been drawn into any trial.
    #[tracing::instrument(skip(conn))]
    pub fn delete(
        team_id: &str,
        conn: &mut SqliteConnection,
    ) -> Result<(), Error> {
        let drawn = diesel::select(diesel::dsl::exists(
            trials::table.filter(
                trials::prosecution_team
                    .eq(team_id)
                    .or(trials::defense_team.eq(team_id)),
            ),
        ))
        .get_result::<bool>(conn)?
            || diesel::select(diesel::dsl::exists(
                round_byes::table.filter(round_byes::team.eq(team_id)),
            ))
            .get_result::<bool>(conn)?;

        if drawn {
            return Err(Error::ValidationFailed(format!(
                "team {team_id} has already been drawn"
            )));
        }

        match diesel::delete(teams::table.filter(teams::id.eq(team_id)))
            .execute(conn)?
        {
            0 => Err(Error::NotFound(format!("team {team_id}"))),
            _ => Ok(()),
        }
    }
}

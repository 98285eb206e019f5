use chrono::NaiveDateTime;
use diesel::{SqliteConnection, prelude::*, sqlite::Sqlite};
use serde::{Deserialize, Serialize};

use crate::{
    Error,
    schema::{courtrooms, trials},
    store::new_id,
    validation,
};

/// A room in which a trial can be held. Courtrooms are not owned by any
/// tournament.
#[derive(
    Queryable, Selectable, Serialize, Deserialize, Debug, Clone, PartialEq, Eq,
)]
#[diesel(table_name = courtrooms)]
#[diesel(check_for_backend(Sqlite))]
pub struct Courtroom {
    pub id: String,
    pub name: String,
    pub location: String,
    pub created: NaiveDateTime,
    pub updated: NaiveDateTime,
}

#[derive(AsChangeset, Deserialize, Default, Clone, Debug)]
#[diesel(table_name = courtrooms)]
pub struct CourtroomChanges {
    pub name: Option<String>,
    pub location: Option<String>,
}

impl Courtroom {
    pub fn fetch(
        courtroom_id: &str,
        conn: &mut SqliteConnection,
    ) -> Result<Courtroom, Error> {
        courtrooms::table
            .filter(courtrooms::id.eq(courtroom_id))
            .select(Courtroom::as_select())
            .first(conn)
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("courtroom {courtroom_id}")))
    }

    /// All courtrooms, ordered by name and then location.
    pub fn list(conn: &mut SqliteConnection) -> Result<Vec<Courtroom>, Error> {
        Ok(courtrooms::table
            .order_by((
                courtrooms::name.asc(),
                courtrooms::location.asc(),
                courtrooms::id.asc(),
            ))
            .select(Courtroom::as_select())
            .load(conn)?)
    }

    #[tracing::instrument(skip(conn))]
    pub fn create(
        name: &str,
        location: &str,
        conn: &mut SqliteConnection,
    ) -> Result<Courtroom, Error> {
        validation::required("name", name, 100)?;
        validation::max_len("location", location, 200)?;

        let id = new_id();
        diesel::insert_into(courtrooms::table)
            .values((
                courtrooms::id.eq(&id),
                courtrooms::name.eq(name),
                courtrooms::location.eq(location),
            ))
            .execute(conn)?;

        Courtroom::fetch(&id, conn)
    }

    pub fn update(
        &self,
        changes: &CourtroomChanges,
        conn: &mut SqliteConnection,
    ) -> Result<Courtroom, Error> {
        if let Some(name) = &changes.name {
            validation::required("name", name, 100)?;
        }
        if let Some(location) = &changes.location {
            validation::max_len("location", location, 200)?;
        }

        diesel::update(courtrooms::table.filter(courtrooms::id.eq(&self.id)))
            .set((changes, courtrooms::updated.eq(diesel::dsl::now)))
            .execute(conn)?;

        Courtroom::fetch(&self.id, conn)
    }

    /// Deletes a courtroom which no trial is using.
    #[tracing::instrument(skip(conn))]
    pub fn delete(
        courtroom_id: &str,
        conn: &mut SqliteConnection,
    ) -> Result<(), Error> {
        let in_use = diesel::select(diesel::dsl::exists(
            trials::table.filter(trials::courtroom.eq(courtroom_id)),
        ))
        .get_result::<bool>(conn)?;

        if in_use {
            return Err(Error::ValidationFailed(format!(
                "courtroom {courtroom_id} is assigned to a trial"
            )));
        }

        match diesel::delete(
            courtrooms::table.filter(courtrooms::id.eq(courtroom_id)),
        )
        .execute(conn)?
        {
            0 => Err(Error::NotFound(format!("courtroom {courtroom_id}"))),
            _ => Ok(()),
        }
    }
}

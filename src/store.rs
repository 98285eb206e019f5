//! Helpers shared by the entity modules, and the startup check of the live
//! schema.

use diesel::{SqliteConnection, prelude::*, sql_types::Text};
use uuid::Uuid;

use crate::Error;

/// The tables (and their columns) which the rest of the crate reads and
/// writes.
pub const EXPECTED_SCHEMA: &[(&str, &[&str])] = &[
    (
        "tournaments",
        &[
            "id",
            "name",
            "year",
            "num_preliminary_rounds",
            "num_elimination_rounds",
            "status",
            "created",
            "updated",
        ],
    ),
    ("schools", &["id", "name", "district", "created", "updated"]),
    ("courtrooms", &["id", "name", "location", "created", "updated"]),
    (
        "teams",
        &[
            "id",
            "tournament",
            "school",
            "team_number",
            "name",
            "created",
            "updated",
        ],
    ),
    ("students", &["id", "name", "school", "created", "updated"]),
    (
        "rounds",
        &[
            "id",
            "number",
            "date",
            "type",
            "published",
            "tournament",
            "created",
            "updated",
        ],
    ),
    (
        "trials",
        &[
            "id",
            "round",
            "prosecution_team",
            "defense_team",
            "courtroom",
            "created",
            "updated",
        ],
    ),
    ("round_byes", &["id", "round", "team", "created"]),
    (
        "round_tickets",
        &["id", "round", "seq", "kind", "acquired", "released"],
    ),
];

pub fn new_id() -> String {
    Uuid::now_v7().to_string()
}

#[derive(QueryableByName)]
struct ColumnName {
    #[diesel(sql_type = Text)]
    name: String,
}

/// Checks every table and column in [`EXPECTED_SCHEMA`] against the live
/// database.
#[tracing::instrument(skip(conn))]
pub fn verify_schema(conn: &mut SqliteConnection) -> Result<(), Error> {
    let mut problems = Vec::new();

    for (table, columns) in EXPECTED_SCHEMA {
        let present = diesel::sql_query(
            "SELECT name FROM pragma_table_info(?) ORDER BY cid",
        )
        .bind::<Text, _>(*table)
        .load::<ColumnName>(conn)?
        .into_iter()
        .map(|column| column.name)
        .collect::<Vec<_>>();

        if present.is_empty() {
            problems.push(format!("missing table `{table}`"));
            continue;
        }

        for column in *columns {
            if !present.iter().any(|name| name == column) {
                problems.push(format!("missing column `{table}.{column}`"));
            }
        }
    }

    if problems.is_empty() {
        tracing::debug!("schema matches");
        Ok(())
    } else {
        tracing::error!(?problems, "schema drift detected");
        Err(Error::StoreUnavailable(format!(
            "the database schema does not match: {}",
            problems.join(", ")
        )))
    }
}

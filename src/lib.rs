//! Round pairing, courtroom allocation and round progression for mock trial
//! tournaments.
//!
//! Tournaments, schools, teams, students, courtrooms, rounds and trials are
//! stored in SQLite (through diesel). On top of this store the crate provides
//! the operations needed to run a tournament: generating power-matched
//! pairings for preliminary rounds, assigning courtrooms, publishing rounds
//! and breaking to a single-elimination bracket.

use diesel_migrations::{EmbeddedMigrations, embed_migrations};

pub mod config;
pub mod engine;
pub mod error;
pub mod schema;
pub mod state;
pub mod store;
pub mod tournaments;
pub mod validation;

#[cfg(test)]
pub mod test;

pub use error::Error;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

use diesel::{
    SqliteConnection,
    connection::SimpleConnection,
    r2d2::{ConnectionManager, CustomizeConnection, Pool},
};
use diesel_migrations::MigrationHarness;

use crate::{Error, MIGRATIONS, config::Config, store};

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;

/// Applied to every connection as it is opened by the pool.
#[derive(Debug)]
struct Customizer {
    busy_timeout_ms: u64,
}

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for Customizer {
    fn on_acquire(
        &self,
        conn: &mut SqliteConnection,
    ) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute(&format!(
            "PRAGMA foreign_keys = ON; PRAGMA busy_timeout = {};",
            self.busy_timeout_ms
        ))
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Builds the connection pool, runs any pending migrations and checks that
/// the live schema matches the one this crate was compiled against.
#[tracing::instrument(skip(config), fields(db = %config.database_url))]
pub fn make_pool(config: &Config) -> Result<DbPool, Error> {
    let pool = open_pool(config)?;

    let mut conn = pool.get()?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| Error::StoreUnavailable(e.to_string()))?;
    store::verify_schema(&mut conn)?;
    drop(conn);

    tracing::info!("entity store ready");

    Ok(pool)
}

/// Builds the connection pool without touching the schema.
pub fn open_pool(config: &Config) -> Result<DbPool, Error> {
    let in_memory = config.database_url == ":memory:";

    Ok(Pool::builder()
        // every in-memory connection is its own database
        .max_size(if in_memory { 1 } else { config.pool_size })
        .connection_timeout(config.store_timeout())
        .connection_customizer(Box::new(Customizer {
            busy_timeout_ms: config.store_timeout_ms,
        }))
        .build(ConnectionManager::<SqliteConnection>::new(
            &config.database_url,
        ))?)
}

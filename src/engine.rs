//! The async entry point to the tournament operations.
//!
//! Every operation runs its store work on a blocking thread (SQLite calls
//! block). Operations on the same round (or, for phase changes, the same
//! tournament) are run one at a time within this process; the pairing
//! tickets stop two processes from pairing the same round at once.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex as StdMutex, PoisonError},
};

use diesel::SqliteConnection;
use tokio::{
    sync::{Mutex, OwnedMutexGuard},
    task::spawn_blocking,
};

use crate::{
    Error,
    config::Config,
    state::{DbPool, make_pool},
    tournaments::{
        Tournament, TournamentStatus, progression,
        rounds::{
            Round,
            pairings::{self, GeneratedPairings},
            publish, room_allocator,
            trials::Trial,
        },
        standings::{Scoresheet, Standings},
    },
};

/// One mutex per key. An entry lives only while somebody holds or waits for
/// its lock.
#[derive(Default)]
struct KeyedLocks {
    locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    async fn lock(self: &Arc<Self>, key: &str) -> KeyGuard {
        let lock = self
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.to_string())
            .or_default()
            .clone();

        KeyGuard {
            guard: Some(lock.lock_owned().await),
            key: key.to_string(),
            locks: self.clone(),
        }
    }
}

struct KeyGuard {
    guard: Option<OwnedMutexGuard<()>>,
    key: String,
    locks: Arc<KeyedLocks>,
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut locks = self
            .locks
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // waiters hold their own clone of the mutex
        if locks
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.key);
        }
    }
}

#[derive(Clone)]
pub struct Engine {
    pool: DbPool,
    config: Arc<Config>,
    scores: Arc<dyn Scoresheet>,
    rounds: Arc<KeyedLocks>,
    tournaments: Arc<KeyedLocks>,
}

impl Engine {
    pub fn new(
        pool: DbPool,
        config: Config,
        scores: Arc<dyn Scoresheet>,
    ) -> Self {
        Self {
            pool,
            config: Arc::new(config),
            scores,
            rounds: Arc::default(),
            tournaments: Arc::default(),
        }
    }

    /// Opens (and migrates) the store named by the configuration.
    pub async fn connect(
        config: Config,
        scores: Arc<dyn Scoresheet>,
    ) -> Result<Self, Error> {
        let pool = {
            let config = config.clone();
            spawn_blocking(move || make_pool(&config)).await??
        };
        Ok(Self::new(pool, config, scores))
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs `f` against a pooled connection on a blocking thread.
    pub async fn with_conn<T, F>(&self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, Error> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        spawn_blocking(move || {
            let mut conn = pool.get()?;
            f(&mut *conn)
        })
        .await?
    }

    #[tracing::instrument(skip(self))]
    pub async fn generate_pairings(
        &self,
        round_id: &str,
        force: bool,
    ) -> Result<GeneratedPairings, Error> {
        let _guard = self.rounds.lock(round_id).await;

        let round_id = round_id.to_string();
        let policy = self.config.pairing.clone();
        let scores = self.scores.clone();
        self.with_conn(move |conn| {
            pairings::generate_pairings(
                &round_id,
                &policy,
                scores.as_ref(),
                force,
                conn,
            )
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn allocate_courtrooms(
        &self,
        round_id: &str,
    ) -> Result<Vec<Trial>, Error> {
        let _guard = self.rounds.lock(round_id).await;

        let round_id = round_id.to_string();
        let policy = self.config.courtrooms.clone();
        self.with_conn(move |conn| {
            room_allocator::allocate_courtrooms(&round_id, &policy, conn)
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn publish_round(&self, round_id: &str) -> Result<Round, Error> {
        let _guard = self.rounds.lock(round_id).await;

        let round_id = round_id.to_string();
        let policy = self.config.publishing.clone();
        self.with_conn(move |conn| publish::publish_round(&round_id, &policy, conn))
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn advance_tournament_phase(
        &self,
        tournament_id: &str,
    ) -> Result<Vec<Round>, Error> {
        let _guard = self.tournaments.lock(tournament_id).await;

        let tournament_id = tournament_id.to_string();
        let policy = self.config.pairing.clone();
        let scores = self.scores.clone();
        self.with_conn(move |conn| {
            progression::advance_phase(
                &tournament_id,
                &policy,
                scores.as_ref(),
                conn,
            )
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn transition_tournament(
        &self,
        tournament_id: &str,
        to: TournamentStatus,
    ) -> Result<Tournament, Error> {
        let _guard = self.tournaments.lock(tournament_id).await;

        let tournament_id = tournament_id.to_string();
        self.with_conn(move |conn| {
            progression::transition_tournament(&tournament_id, to, conn)
        })
        .await
    }

    pub async fn standings(
        &self,
        tournament_id: &str,
    ) -> Result<Standings, Error> {
        let tournament_id = tournament_id.to_string();
        let scores = self.scores.clone();
        self.with_conn(move |conn| {
            Tournament::fetch(&tournament_id, conn)?;
            Standings::fetch(&tournament_id, scores.as_ref(), conn)
        })
        .await
    }
}

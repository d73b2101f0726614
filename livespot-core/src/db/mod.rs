// livespot-core/src/db/mod.rs
//
// The shared Postgres pool. Repositories clone the pool out of it; nothing
// else in the crate opens connections.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use tracing::info;
use crate::Error;

/// Cast monitors, the batch writer, the trigger engine and the outreach
/// worker each hold at most a couple of connections at a time.
const MAX_CONNECTIONS: u32 = 10;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct Database {
    pool: Pool<Postgres>,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, Error> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(database_url)
            .await?;

        info!("[DB] connected (pool of {})", MAX_CONNECTIONS);
        Ok(Self { pool })
    }

    /// Applies `migrations/` at the workspace root.
    pub async fn migrate(&self) -> Result<(), Error> {
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("[DB] schema up to date");
        Ok(())
    }

    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }

    /// Wraps an existing pool; the test database helper builds one this way.
    pub fn from_pool(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct DatabaseProcessor {
    executor: sqlx::PgPool,
}

impl DatabaseProcessor {
    pub fn new(executor: sqlx::PgPool) -> Self {
        Self { executor }
    }

    /// Open a pool against `url`. One connection is established before returning, so an
    /// unreachable database fails start-up.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, crate::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(30))
            .connect(url)
            .await?;
        info!(max_connections, "PostgreSQL connection pool initialized");
        Ok(Self::new(pool))
    }

    pub fn db(&self) -> &sqlx::PgPool {
        debug!(monotonic_counter.sql = 1);
        &self.executor
    }
}

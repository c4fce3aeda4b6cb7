use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use thiserror::Error;
use uuid::Uuid;

use crate::types::PostgresConfig;

pub mod models;
pub mod store;

pub use store::{MemoryWagerStore, WagerStore};

pub type PgPool = Pool<Postgres>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("corrupt wager row {id}: {detail}")]
    Corrupt { id: Uuid, detail: String },

    #[error("wager {0} not found")]
    NotFound(Uuid),

    #[error("wager {0} is no longer pending; refusing to settle twice")]
    AlreadySettled(Uuid),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Create a PostgreSQL connection pool using the provided config.
///
/// Small, conservative pool suitable for a single engine instance.
/// Connection establishment is eager so misconfiguration surfaces at
/// startup rather than mid-cycle.
pub async fn create_pg_pool(cfg: &PostgresConfig) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(std::time::Duration::from_secs(15))
        .connect(&cfg.url)
        .await?;
    Ok(pool)
}

//! Persistence layer (spec.md §4.A): typed operations, each mapping to one
//! SQL statement or one transaction, over the six tables from §6.

mod anon_keys;
mod boxes;
mod incoming;
mod outgoing;
mod rows;
mod supervisor;

use slicebox_core::SliceboxError;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Handle to the connection pool. Cheap to clone; every method takes `&self`.
#[derive(Debug, Clone)]
pub struct Db {
    pool: PgPool,
}

impl Db {
    pub async fn connect(database_url: &str) -> Result<Self, SliceboxError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| SliceboxError::transient(format!("db connect failed: {e}")))?;
        Ok(Self { pool })
    }

    /// Wrap an already-constructed pool, e.g. from a test harness.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), SliceboxError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| SliceboxError::internal(format!("migration failed: {e}")))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Classify a raw `sqlx::Error` into the `Validation`/`Transient`/`Internal`
/// kinds spec.md §7 distinguishes. Unique-constraint violations surface as
/// `Conflict` rather than `Internal`; `update_incoming`/`update_outgoing_transaction`
/// avoid hitting this path for a replayed write by pre-checking existence
/// inside the same transaction, so `Conflict` in practice means two writers
/// raced past that check, not a routine retry.
pub(crate) fn classify_sqlx_error(e: sqlx::Error) -> SliceboxError {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.is_unique_violation() {
            return SliceboxError::conflict(db_err.message().to_string());
        }
    }
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
            SliceboxError::transient(format!("db transient failure: {e}"))
        }
        other => SliceboxError::internal(format!("db error: {other}")),
    }
}

pub use anon_keys::*;
pub use boxes::*;
pub use incoming::*;
pub use outgoing::*;
pub use supervisor::*;

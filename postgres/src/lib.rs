//! Postgres persistence for the CRM projections.
//!
//! Two ledgers live here:
//!
//! - [`PgParkedEventLog`]: every delivery a subscriber parked, for operators
//!   to investigate and replay
//! - [`PgSyncRunStore`]: per-record statuses of external sync runs
//!
//! # Example
//!
//! ```no_run
//! use crm_projections_postgres::{PgParkedEventLog, connect};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = connect("postgres://localhost/crm").await?;
//!     let ledger = PgParkedEventLog::new(pool);
//!     println!("{} parked events pending", ledger.count_pending().await?);
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod parked_events;
mod sync_runs;

pub use parked_events::{ParkedEntry, ParkedStatus, PgParkedEventLog};
pub use sync_runs::{PgSyncRunStore, StoredSyncRun};

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

/// Ledger errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Query or connection failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failure
    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored status is not one we know
    #[error("Invalid parked status: {0}")]
    InvalidStatus(String),

    /// No ledger entry with this id
    #[error("Parked event {0} not found")]
    NotFound(i64),
}

/// Connect to `database_url` and bring the schema up to date.
///
/// # Errors
///
/// Returns [`StoreError`] if the connection or a migration fails.
pub async fn connect(database_url: &str) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new().max_connections(5).connect(database_url).await?;
    migrate(&pool).await?;
    Ok(pool)
}

/// Apply pending migrations.
///
/// # Errors
///
/// Returns [`StoreError::Migration`] if a migration fails.
pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

//! Sync run persistence.

use crate::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crm_projections_core::sync::{SyncError, SyncResult, SyncRun, SyncRunStore, SyncStatus};
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Summary row of a stored run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSyncRun {
    /// Run id
    pub id: Uuid,
    /// Tenant
    pub tenant: String,
    /// External system of the batch
    pub external_system: String,
    /// Entity type synced
    pub entity: String,
    /// When the run started
    pub sync_date: DateTime<Utc>,
    /// Counts
    pub result: SyncResult,
}

/// [`SyncRunStore`] over the `sync_runs` and `sync_run_statuses` tables.
#[derive(Debug, Clone)]
pub struct PgSyncRunStore {
    pool: PgPool,
}

impl PgSyncRunStore {
    /// Store over `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Write a run and its statuses in one transaction. Returns the run id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if any insert fails; nothing is kept then.
    pub async fn insert(&self, run: &SyncRun, statuses: &[SyncStatus]) -> Result<Uuid, StoreError> {
        let summary = SyncResult::from_statuses(statuses);
        let id = Uuid::new_v4();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r"
            INSERT INTO sync_runs (
                id, tenant, external_system, app_source, entity, sync_date,
                completed, skipped, failed
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ",
        )
        .bind(id)
        .bind(&run.tenant)
        .bind(&run.external_system)
        .bind(&run.app_source)
        .bind(&run.entity)
        .bind(run.sync_date)
        .bind(count(summary.completed))
        .bind(count(summary.skipped))
        .bind(count(summary.failed))
        .execute(&mut *tx)
        .await?;

        for (position, status) in statuses.iter().enumerate() {
            sqlx::query(
                "INSERT INTO sync_run_statuses (run_id, position, outcome, reason) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(id)
            .bind(count(position))
            .bind(status.outcome.as_str())
            .bind(&status.reason)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        tracing::debug!(
            run_id = %id,
            tenant = %run.tenant,
            entity = %run.entity,
            completed = summary.completed,
            failed = summary.failed,
            "Sync run saved"
        );
        Ok(id)
    }

    /// Most recent runs of a tenant, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    pub async fn recent_runs(
        &self,
        tenant: &str,
        limit: usize,
    ) -> Result<Vec<StoredSyncRun>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(
            r"
            SELECT r.id, r.tenant, r.external_system, r.entity, r.sync_date,
                   r.completed, r.skipped, r.failed,
                   COALESCE(
                       ARRAY_AGG(s.reason ORDER BY s.position) FILTER (WHERE s.outcome = 'FAILED'),
                       '{}'
                   ) AS reasons
            FROM sync_runs r
            LEFT JOIN sync_run_statuses s ON s.run_id = r.id
            WHERE r.tenant = $1
            GROUP BY r.id
            ORDER BY r.sync_date DESC
            LIMIT $2
            ",
        )
        .bind(tenant)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(StoredSyncRun {
                    id: row.try_get("id")?,
                    tenant: row.try_get("tenant")?,
                    external_system: row.try_get("external_system")?,
                    entity: row.try_get("entity")?,
                    sync_date: row.try_get("sync_date")?,
                    result: SyncResult {
                        completed: usize_of(row.try_get("completed")?),
                        skipped: usize_of(row.try_get("skipped")?),
                        failed: usize_of(row.try_get("failed")?),
                        reasons: row.try_get("reasons")?,
                    },
                })
            })
            .collect()
    }
}

#[async_trait]
impl SyncRunStore for PgSyncRunStore {
    async fn save(&self, run: &SyncRun, statuses: &[SyncStatus]) -> Result<(), SyncError> {
        self.insert(run, statuses)
            .await
            .map(|_| ())
            .map_err(|e| SyncError::Store(e.to_string()))
    }
}

fn count(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

fn usize_of(n: i32) -> usize {
    usize::try_from(n).unwrap_or_default()
}

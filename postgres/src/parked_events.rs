//! Ledger of parked deliveries.
//!
//! Every delivery a subscription group parks is recorded here with the
//! error that parked it, so operators can investigate and replay it.
//! Entries start `PENDING` and end `RESOLVED` (replayed or fixed) or
//! `DISCARDED` (cannot be fixed).

use crate::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crm_projections_core::subscription::{ParkedEvent, ParkedEventLog, Receipt, SubscriptionError};
use sqlx::{PgPool, Row};

/// Lifecycle of a parked entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParkedStatus {
    /// Waiting for an operator
    Pending,
    /// Replayed or otherwise handled
    Resolved,
    /// Given up on
    Discarded,
}

impl ParkedStatus {
    /// Storage form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Resolved => "RESOLVED",
            Self::Discarded => "DISCARDED",
        }
    }

    /// Parse the storage form.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidStatus`] for unknown values.
    pub fn parse(s: &str) -> Result<Self, StoreError> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "RESOLVED" => Ok(Self::Resolved),
            "DISCARDED" => Ok(Self::Discarded),
            _ => Err(StoreError::InvalidStatus(s.to_string())),
        }
    }
}

/// A stored ledger entry.
#[derive(Debug, Clone)]
pub struct ParkedEntry {
    /// Ledger id
    pub id: i64,
    /// The delivery as it was parked
    pub parked: ParkedEvent,
    /// Current status
    pub status: ParkedStatus,
    /// When it was parked
    pub parked_at: DateTime<Utc>,
    /// When it was resolved or discarded
    pub resolved_at: Option<DateTime<Utc>>,
    /// Who resolved it
    pub resolved_by: Option<String>,
    /// Resolution or discard notes
    pub resolution_notes: Option<String>,
}

/// [`ParkedEventLog`] stored in the `parked_events` table.
///
/// # Example
///
/// ```no_run
/// use crm_projections_postgres::PgParkedEventLog;
///
/// # async fn example(pool: sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// let ledger = PgParkedEventLog::new(pool);
/// for entry in ledger.list_pending(100).await? {
///     println!("{} parked: {}", entry.id, entry.parked.reason);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct PgParkedEventLog {
    pool: PgPool,
}

impl PgParkedEventLog {
    /// Ledger over `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a parked delivery. Returns its ledger id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the insert fails.
    pub async fn add_entry(&self, parked: &ParkedEvent) -> Result<i64, StoreError> {
        let (id,): (i64,) = sqlx::query_as(
            r"
            INSERT INTO parked_events (
                subscription_group, event_id, event_type, aggregate_id, tenant,
                reason, payload, stream, stream_partition, stream_offset
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id
            ",
        )
        .bind(&parked.group)
        .bind(&parked.event_id)
        .bind(&parked.event_type)
        .bind(&parked.aggregate_id)
        .bind(&parked.tenant)
        .bind(&parked.reason)
        .bind(&parked.payload)
        .bind(&parked.receipt.stream)
        .bind(parked.receipt.partition)
        .bind(parked.receipt.offset)
        .fetch_one(&self.pool)
        .await?;

        tracing::warn!(
            parked_id = id,
            group = %parked.group,
            event_type = parked.event_type.as_deref().unwrap_or("unknown"),
            reason = %parked.reason,
            "Parked event recorded"
        );
        metrics::counter!("projections.parked.recorded", "group" => parked.group.clone())
            .increment(1);

        Ok(id)
    }

    /// Oldest pending entries first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails or a row is malformed.
    pub async fn list_pending(&self, limit: usize) -> Result<Vec<ParkedEntry>, StoreError> {
        self.list_by_status(ParkedStatus::Pending, limit).await
    }

    /// Entries with `status`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails or a row is malformed.
    pub async fn list_by_status(
        &self,
        status: ParkedStatus,
        limit: usize,
    ) -> Result<Vec<ParkedEntry>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(
            r"
            SELECT
                id, subscription_group, event_id, event_type, aggregate_id, tenant,
                reason, payload, stream, stream_partition, stream_offset,
                status, parked_at, resolved_at, resolved_by, resolution_notes
            FROM parked_events
            WHERE status = $1
            ORDER BY parked_at ASC, id ASC
            LIMIT $2
            ",
        )
        .bind(status.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_entry).collect()
    }

    /// One entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if there is no such entry.
    pub async fn get_by_id(&self, id: i64) -> Result<ParkedEntry, StoreError> {
        let row = sqlx::query(
            r"
            SELECT
                id, subscription_group, event_id, event_type, aggregate_id, tenant,
                reason, payload, stream, stream_partition, stream_offset,
                status, parked_at, resolved_at, resolved_by, resolution_notes
            FROM parked_events
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound(id))?;

        Self::row_to_entry(&row)
    }

    /// Mark an entry as handled.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the update fails or the entry does not exist.
    pub async fn mark_resolved(
        &self,
        id: i64,
        resolved_by: &str,
        notes: Option<&str>,
    ) -> Result<(), StoreError> {
        self.close(id, ParkedStatus::Resolved, Some(resolved_by), notes).await?;
        tracing::info!(parked_id = id, resolved_by, "Parked event resolved");
        metrics::counter!("projections.parked.resolved").increment(1);
        Ok(())
    }

    /// Give up on an entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the update fails or the entry does not exist.
    pub async fn mark_discarded(&self, id: i64, reason: &str) -> Result<(), StoreError> {
        self.close(id, ParkedStatus::Discarded, None, Some(reason)).await?;
        tracing::warn!(parked_id = id, reason, "Parked event discarded");
        metrics::counter!("projections.parked.discarded").increment(1);
        Ok(())
    }

    /// Number of pending entries.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    pub async fn count_pending(&self) -> Result<i64, StoreError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM parked_events WHERE status = $1")
                .bind(ParkedStatus::Pending.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn close(
        &self,
        id: i64,
        status: ParkedStatus,
        resolved_by: Option<&str>,
        notes: Option<&str>,
    ) -> Result<(), StoreError> {
        let updated = sqlx::query(
            r"
            UPDATE parked_events
            SET status = $1,
                resolved_at = NOW(),
                resolved_by = $2,
                resolution_notes = $3
            WHERE id = $4
            ",
        )
        .bind(status.as_str())
        .bind(resolved_by)
        .bind(notes)
        .bind(id)
        .execute(&self.pool)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    fn row_to_entry(row: &sqlx::postgres::PgRow) -> Result<ParkedEntry, StoreError> {
        let status: String = row.try_get("status")?;
        Ok(ParkedEntry {
            id: row.try_get("id")?,
            parked: ParkedEvent {
                group: row.try_get("subscription_group")?,
                event_id: row.try_get("event_id")?,
                event_type: row.try_get("event_type")?,
                aggregate_id: row.try_get("aggregate_id")?,
                tenant: row.try_get("tenant")?,
                reason: row.try_get("reason")?,
                payload: row.try_get("payload")?,
                receipt: Receipt {
                    stream: row.try_get("stream")?,
                    partition: row.try_get("stream_partition")?,
                    offset: row.try_get("stream_offset")?,
                },
            },
            status: ParkedStatus::parse(&status)?,
            parked_at: row.try_get("parked_at")?,
            resolved_at: row.try_get("resolved_at")?,
            resolved_by: row.try_get("resolved_by")?,
            resolution_notes: row.try_get("resolution_notes")?,
        })
    }
}

#[async_trait]
impl ParkedEventLog for PgParkedEventLog {
    async fn record(&self, parked: ParkedEvent) -> Result<(), SubscriptionError> {
        self.add_entry(&parked)
            .await
            .map(|_| ())
            .map_err(|e| SubscriptionError::Park(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn status_storage_form_parses_back() {
        for status in [ParkedStatus::Pending, ParkedStatus::Resolved, ParkedStatus::Discarded] {
            assert_eq!(ParkedStatus::parse(status.as_str()).unwrap(), status);
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!(matches!(
            ParkedStatus::parse("pending"),
            Err(StoreError::InvalidStatus(s)) if s == "pending"
        ));
    }
}

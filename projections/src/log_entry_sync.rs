//! Batch import of log entries from external systems.
//!
//! Every record of a batch is processed on its own task, at most
//! `concurrency` at a time. Looking up an existing entry and upserting it
//! happens under one lock so two records with the same external id never
//! both create an entry. Each record ends as a [`SyncStatus`]; the run is
//! persisted through the [`SyncRunStore`] and summarised as a [`SyncResult`].

use crate::graph::GraphContext;
use chrono::{DateTime, Utc};
use crm_projections_core::command::Command;
use crm_projections_core::events::{ExternalSystem, Source};
use crm_projections_core::graph::{Direction, NodeLabel, NodeRef, Properties, RelationshipType};
use crm_projections_core::handler::HandlerError;
use crm_projections_core::sync::{
    LogEntryData, SyncError, SyncResult, SyncRun, SyncRunStore, SyncStatus,
    is_accepted_external_system,
};
use crm_projections_runtime::await_condition;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;

/// Entity name recorded on log entry sync runs.
pub const LOG_ENTRY_ENTITY: &str = "logEntry";

/// Imports log entries and records the outcome of each one.
#[derive(Clone)]
pub struct LogEntrySyncService {
    ctx: GraphContext,
    store: Arc<dyn SyncRunStore>,
    limiter: Arc<Semaphore>,
    sync_lock: Arc<Mutex<()>>,
}

impl std::fmt::Debug for LogEntrySyncService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogEntrySyncService")
            .field("available_permits", &self.limiter.available_permits())
            .finish_non_exhaustive()
    }
}

impl LogEntrySyncService {
    /// Service running at most `concurrency` records at once.
    #[must_use]
    pub fn new(ctx: GraphContext, store: Arc<dyn SyncRunStore>, concurrency: usize) -> Self {
        Self {
            ctx,
            store,
            limiter: Arc::new(Semaphore::new(concurrency.max(1))),
            sync_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Sync a batch of log entries for `tenant`.
    ///
    /// Record-level problems end up in the result; only batch-level
    /// validation aborts the run.
    ///
    /// # Errors
    ///
    /// - [`SyncError::TenantNotValid`] if the tenant is not in the graph
    /// - [`SyncError::MissingExternalSystem`] if a record has no external system
    /// - [`SyncError::ExternalSystemNotAccepted`] if a record's external
    ///   system may not be synced from
    /// - [`SyncError::Store`] if the tenant lookup fails
    #[tracing::instrument(skip(self, entries), fields(entries = entries.len()))]
    pub async fn sync_log_entries(
        &self,
        tenant: &str,
        entries: Vec<LogEntryData>,
    ) -> Result<SyncResult, SyncError> {
        self.validate(tenant, &entries).await?;
        let Some(first) = entries.first() else {
            return Ok(SyncResult::default());
        };
        let run = SyncRun {
            tenant: tenant.to_string(),
            external_system: first.external_system.trim().to_lowercase(),
            app_source: first.app_source.clone(),
            entity: LOG_ENTRY_ENTITY.to_string(),
            sync_date: self.ctx.now(),
        };

        let statuses = Arc::new(Mutex::new(Vec::with_capacity(entries.len())));
        let mut tasks = JoinSet::new();
        for entry in entries {
            let Ok(permit) = Arc::clone(&self.limiter).acquire_owned().await else {
                break;
            };
            let service = self.clone();
            let statuses = Arc::clone(&statuses);
            let tenant = tenant.to_string();
            let sync_date = run.sync_date;
            tasks.spawn(async move {
                let status = service.sync_log_entry(&tenant, entry, sync_date).await;
                statuses.lock().await.push(status);
                drop(permit);
            });
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(tenant, error = %e, "Log entry sync task aborted");
                statuses.lock().await.push(SyncStatus::failed(format!("sync task aborted: {e}")));
            }
        }

        let statuses = std::mem::take(&mut *statuses.lock().await);
        if let Err(e) = self.store.save(&run, &statuses).await {
            tracing::error!(tenant, error = %e, "Failed to save log entry sync run");
        }
        let result = SyncResult::from_statuses(&statuses);
        tracing::info!(
            tenant,
            completed = result.completed,
            skipped = result.skipped,
            failed = result.failed,
            "Log entry sync finished"
        );
        Ok(result)
    }

    async fn validate(&self, tenant: &str, entries: &[LogEntryData]) -> Result<(), SyncError> {
        let exists = self
            .ctx
            .graph
            .get_node(tenant, &NodeRef::tenant(tenant))
            .await
            .map_err(|e| SyncError::Store(e.to_string()))?;
        if exists.is_none() {
            return Err(SyncError::TenantNotValid);
        }
        for entry in entries {
            let system = entry.external_system.trim();
            if system.is_empty() {
                return Err(SyncError::MissingExternalSystem);
            }
            if !is_accepted_external_system(system) {
                return Err(SyncError::ExternalSystemNotAccepted(system.to_string()));
            }
        }
        Ok(())
    }

    async fn sync_log_entry(
        &self,
        tenant: &str,
        mut entry: LogEntryData,
        sync_date: DateTime<Utc>,
    ) -> SyncStatus {
        entry.normalize();

        let system = NodeRef::new(NodeLabel::ExternalSystem, entry.external_system.as_str());
        if let Err(e) = self
            .ctx
            .graph
            .merge_node(
                tenant,
                &system,
                Properties::new().with("createdAt", sync_date),
                Properties::new(),
            )
            .await
        {
            tracing::error!(
                tenant,
                external_system = %entry.external_system,
                error = %e,
                "Failed to merge external system"
            );
            return SyncStatus::failed(format!(
                "failed merging external system {} for tenant {tenant}: {e}",
                entry.external_system
            ));
        }

        if entry.skip {
            return SyncStatus::skipped(entry.skip_reason);
        }

        let organization_ids = match self.logged_organization_ids(tenant, &entry).await {
            Ok(ids) => ids,
            Err(reason) => return SyncStatus::failed(reason),
        };

        let _guard = self.sync_lock.lock().await;

        let existing = match self
            .find_linked(tenant, NodeLabel::LogEntry, &entry.external_system, &entry.external_id)
            .await
        {
            Ok(existing) => existing,
            Err(e) => {
                return SyncStatus::failed(format!(
                    "failed looking up log entry {} for tenant {tenant}: {e}",
                    entry.external_id
                ));
            }
        };
        let author_user_id = if entry.author_user.is_empty() {
            String::new()
        } else {
            self.find_linked(tenant, NodeLabel::User, &entry.external_system, &entry.author_user)
                .await
                .ok()
                .flatten()
                .unwrap_or_default()
        };

        let app_source = if entry.app_source.is_empty() {
            self.ctx.app_source.clone()
        } else {
            entry.app_source.clone()
        };
        let command = Command::UpsertLogEntry {
            tenant: tenant.to_string(),
            log_entry_id: existing.clone().unwrap_or_default(),
            content: entry.content,
            content_type: entry.content_type,
            started_at: entry.started_at.or(entry.created_at).or(Some(sync_date)),
            author_user_id,
            logged_organization_ids: organization_ids,
            source: Source {
                source: entry.external_system.clone(),
                source_of_truth: entry.external_system.clone(),
                app_source,
            },
            external_system: ExternalSystem {
                external_system_id: entry.external_system.clone(),
                external_id: entry.external_id.clone(),
                external_id_second: String::new(),
                external_url: entry.external_url,
                external_source: entry.external_source_entity,
                sync_date: Some(sync_date),
            },
        };
        let ack = match self.ctx.send(command).await {
            Ok(ack) => ack,
            Err(e) => {
                tracing::error!(
                    tenant,
                    external_id = %entry.external_id,
                    error = %e,
                    "Failed to upsert log entry"
                );
                return SyncStatus::failed(format!(
                    "failed sending event to upsert log entry with external reference {} for tenant {tenant}: {e}",
                    entry.external_id
                ));
            }
        };

        if existing.is_none() {
            self.await_visible(tenant, &ack.id).await;
        }
        SyncStatus::success()
    }

    /// Graph ids of the logged organizations, primary first.
    async fn logged_organization_ids(
        &self,
        tenant: &str,
        entry: &LogEntryData,
    ) -> Result<Vec<String>, String> {
        let mut ids: Vec<String> = Vec::new();
        for reference in entry.logged_organization_refs() {
            match self
                .find_linked(tenant, NodeLabel::Organization, &entry.external_system, reference)
                .await
            {
                Ok(Some(id)) if !ids.contains(&id) => ids.push(id),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(
                        tenant,
                        reference,
                        error = %e,
                        "Failed to resolve logged organization"
                    );
                }
            }
        }
        if ids.is_empty() && entry.logged_entity_required {
            return Err(format!(
                "organization not found for log entry {} for tenant {tenant}",
                entry.external_id
            ));
        }
        Ok(ids)
    }

    /// Id of the `label` node linked to `external_system` under `external_id`.
    async fn find_linked(
        &self,
        tenant: &str,
        label: NodeLabel,
        external_system: &str,
        external_id: &str,
    ) -> Result<Option<String>, HandlerError> {
        let system = NodeRef::new(NodeLabel::ExternalSystem, external_system);
        let linked = self
            .ctx
            .graph
            .related(tenant, &system, RelationshipType::IsLinkedWith, Direction::Incoming, label)
            .await?;
        Ok(linked
            .into_iter()
            .find(|r| r.edge.get_str("externalId") == Some(external_id))
            .map(|r| r.node.id))
    }

    async fn await_visible(&self, tenant: &str, log_entry_id: &str) {
        let graph = &self.ctx.graph;
        let node = &NodeRef::new(NodeLabel::LogEntry, log_entry_id);
        let visible = await_condition(&self.ctx.visibility, || async move {
            graph.get_node(tenant, node).await.map(|found| found.is_some())
        })
        .await;
        if let Err(e) = visible {
            tracing::warn!(tenant, log_entry_id, error = %e, "Log entry not visible yet");
        }
    }
}

//! Event-completed notifications.
//!
//! After a projection lands, dependent caches are told which entity changed.
//! The signal is fire-and-forget: callers log a failure and move on.

use crate::graph::NodeLabel;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Notification delivery failed.
#[derive(Error, Debug, Clone)]
#[error("Event completed notification failed: {0}")]
pub struct NotifyError(pub String);

/// What happened to the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompletionKind {
    /// Entity created
    Create,
    /// Entity updated
    Update,
    /// Entity deleted
    Delete,
}

/// One completion signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventCompleted {
    /// Tenant
    pub tenant: String,
    /// Entity type
    pub entity: NodeLabel,
    /// Entity id
    pub entity_id: String,
    /// Operation
    pub kind: CompletionKind,
    /// When the projection completed
    pub at: DateTime<Utc>,
}

impl EventCompleted {
    /// Update of `entity`.
    #[must_use]
    pub fn update(tenant: &str, entity: NodeLabel, entity_id: &str) -> Self {
        Self::new(tenant, entity, entity_id, CompletionKind::Update)
    }

    /// Deletion of `entity`.
    #[must_use]
    pub fn delete(tenant: &str, entity: NodeLabel, entity_id: &str) -> Self {
        Self::new(tenant, entity, entity_id, CompletionKind::Delete)
    }

    /// Creation of `entity`.
    #[must_use]
    pub fn create(tenant: &str, entity: NodeLabel, entity_id: &str) -> Self {
        Self::new(tenant, entity, entity_id, CompletionKind::Create)
    }

    fn new(tenant: &str, entity: NodeLabel, entity_id: &str, kind: CompletionKind) -> Self {
        Self {
            tenant: tenant.to_string(),
            entity,
            entity_id: entity_id.to_string(),
            kind,
            at: Utc::now(),
        }
    }
}

/// Publishes completion signals.
#[async_trait]
pub trait EventCompletedNotifier: Send + Sync {
    /// Publish one signal.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] if the signal could not be sent.
    async fn notify(&self, completed: EventCompleted) -> Result<(), NotifyError>;
}

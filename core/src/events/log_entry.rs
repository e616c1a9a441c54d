//! Log entry and comment payloads.

use super::{ExternalSystem, Source};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `V1_LOG_ENTRY_CREATE`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogEntryCreateEvent {
    /// Tenant
    pub tenant: String,
    /// Body
    pub content: String,
    /// Mime type of the body
    pub content_type: String,
    /// When the logged activity happened
    pub started_at: Option<DateTime<Utc>>,
    /// Author
    pub author_user_id: String,
    /// Organization the entry is logged on
    pub logged_organization_id: String,
    /// Origin
    pub source: Source,
    /// External system link
    pub external_system: ExternalSystem,
    /// Creation time
    pub created_at: Option<DateTime<Utc>>,
    /// Update time
    pub updated_at: Option<DateTime<Utc>>,
}

/// `V1_LOG_ENTRY_UPDATE`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogEntryUpdateEvent {
    /// Tenant
    pub tenant: String,
    /// Body
    pub content: String,
    /// Mime type of the body
    pub content_type: String,
    /// When the logged activity happened
    pub started_at: Option<DateTime<Utc>>,
    /// Organization the entry is logged on
    pub logged_organization_id: String,
    /// Source of truth
    pub source_of_truth: String,
    /// Update time
    pub updated_at: Option<DateTime<Utc>>,
}

/// `V1_COMMENT_CREATE`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommentCreateEvent {
    /// Tenant
    pub tenant: String,
    /// Body
    pub content: String,
    /// Mime type of the body
    pub content_type: String,
    /// Author
    pub author_user_id: String,
    /// Issue the comment belongs to
    pub commented_issue_id: String,
    /// Origin
    pub source: Source,
    /// External system link
    pub external_system: ExternalSystem,
    /// Creation time
    pub created_at: Option<DateTime<Utc>>,
    /// Update time
    pub updated_at: Option<DateTime<Utc>>,
}

/// `V1_COMMENT_UPDATE`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommentUpdateEvent {
    /// Tenant
    pub tenant: String,
    /// Body
    pub content: String,
    /// Mime type of the body
    pub content_type: String,
    /// Origin of the update
    pub source: String,
    /// External system link
    pub external_system: ExternalSystem,
    /// Update time
    pub updated_at: Option<DateTime<Utc>>,
}

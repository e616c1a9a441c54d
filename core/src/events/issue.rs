//! Issue payloads.

use super::{ExternalSystem, Source};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `V1_ISSUE_CREATE`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IssueCreateEvent {
    /// Tenant
    pub tenant: String,
    /// Subject line
    pub subject: String,
    /// Description
    pub description: String,
    /// Status, e.g. `open`
    pub status: String,
    /// Priority
    pub priority: String,
    /// Organization the issue was reported by
    pub reported_by_organization_id: String,
    /// Organization that submitted the issue
    pub submitted_by_organization_id: String,
    /// User that submitted the issue
    pub submitted_by_user_id: String,
    /// Origin
    pub source: Source,
    /// External system link
    pub external_system: ExternalSystem,
    /// Creation time
    pub created_at: Option<DateTime<Utc>>,
    /// Update time
    pub updated_at: Option<DateTime<Utc>>,
}

/// `V1_ISSUE_UPDATE`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IssueUpdateEvent {
    /// Tenant
    pub tenant: String,
    /// Subject line
    pub subject: String,
    /// Description
    pub description: String,
    /// Status
    pub status: String,
    /// Priority
    pub priority: String,
    /// Origin of the update
    pub source: String,
    /// External system link
    pub external_system: ExternalSystem,
    /// Update time
    pub updated_at: Option<DateTime<Utc>>,
}

/// Assignee or follower added to or removed from an issue.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IssueUserEvent {
    /// Tenant
    pub tenant: String,
    /// User
    pub user_id: String,
    /// Change time
    pub at: Option<DateTime<Utc>>,
}

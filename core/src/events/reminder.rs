//! Reminder payloads.

use super::Source;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `V1_REMINDER_CREATE`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReminderCreateEvent {
    /// Tenant
    pub tenant: String,
    /// Reminder text
    pub content: String,
    /// Due date
    pub due_date: Option<DateTime<Utc>>,
    /// Owner
    pub user_id: String,
    /// Organization the reminder is about
    pub organization_id: String,
    /// Already dismissed
    pub dismissed: bool,
    /// Origin
    pub source: Source,
    /// Creation time
    pub created_at: Option<DateTime<Utc>>,
}

/// `V1_REMINDER_UPDATE`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReminderUpdateEvent {
    /// Tenant
    pub tenant: String,
    /// Reminder text
    pub content: String,
    /// Due date
    pub due_date: Option<DateTime<Utc>>,
    /// Dismissed
    pub dismissed: bool,
    /// Fields to write; empty means all
    pub fields_mask: Vec<String>,
    /// Update time
    pub updated_at: Option<DateTime<Utc>>,
}

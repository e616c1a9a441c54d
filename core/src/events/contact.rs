//! Link payloads shared by contacts, organizations and users.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Phone number linked to a contact, organization or user.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LinkPhoneNumberEvent {
    /// Tenant
    pub tenant: String,
    /// Linked phone number
    pub phone_number_id: String,
    /// Primary number of the owner
    pub primary: bool,
    /// Label such as `WORK` or `MOBILE`
    pub label: String,
    /// Link time
    pub updated_at: Option<DateTime<Utc>>,
}

/// Location linked to a contact or organization.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LinkLocationEvent {
    /// Tenant
    pub tenant: String,
    /// Linked location
    pub location_id: String,
    /// Link time
    pub updated_at: Option<DateTime<Utc>>,
}

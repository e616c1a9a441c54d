//! Organization billing profile payloads.

use super::Source;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `V1_ORGANIZATION_CREATE_BILLING_PROFILE`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BillingProfileCreateEvent {
    /// Tenant
    pub tenant: String,
    /// Billing profile node id
    pub billing_profile_id: String,
    /// Legal name
    pub legal_name: String,
    /// Tax id
    pub tax_id: String,
    /// Origin
    pub source: Source,
    /// Creation time
    pub created_at: Option<DateTime<Utc>>,
    /// Update time
    pub updated_at: Option<DateTime<Utc>>,
}

/// `V1_ORGANIZATION_UPDATE_BILLING_PROFILE`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BillingProfileUpdateEvent {
    /// Tenant
    pub tenant: String,
    /// Billing profile node id
    pub billing_profile_id: String,
    /// Legal name
    pub legal_name: String,
    /// Tax id
    pub tax_id: String,
    /// Fields to write; empty means all
    pub fields_mask: Vec<String>,
    /// Update time
    pub updated_at: Option<DateTime<Utc>>,
}

/// Email linked to or unlinked from a billing profile.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BillingProfileEmailEvent {
    /// Tenant
    pub tenant: String,
    /// Billing profile node id
    pub billing_profile_id: String,
    /// Email node id
    pub email_id: String,
    /// Primary email of the profile, link only
    pub primary: bool,
    /// Update time
    pub updated_at: Option<DateTime<Utc>>,
}

/// Location linked to or unlinked from a billing profile.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BillingProfileLocationEvent {
    /// Tenant
    pub tenant: String,
    /// Billing profile node id
    pub billing_profile_id: String,
    /// Location node id
    pub location_id: String,
    /// Update time
    pub updated_at: Option<DateTime<Utc>>,
}

//! Email payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `V1_EMAIL_VALIDATE`: validation requested for the email node.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmailValidateEvent {
    /// Tenant
    pub tenant: String,
    /// Address to validate, read from the graph when empty
    pub raw_email: String,
    /// Request time
    pub validated_at: Option<DateTime<Utc>>,
}

/// `V2_EMAIL_VALIDATED`: full validation report.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[allow(clippy::struct_excessive_bools)]
pub struct EmailValidatedV2Event {
    /// Tenant
    pub tenant: String,
    /// Raw address that was validated
    pub email: String,
    /// Domain part
    pub domain: String,
    /// Local part
    pub username: String,
    /// RFC syntax check passed
    pub is_valid_syntax: bool,
    /// Deliverability is risky
    pub is_risky: bool,
    /// Behind a firewall
    pub is_firewalled: bool,
    /// Mail provider
    pub provider: String,
    /// Firewall vendor
    pub firewall: String,
    /// Domain accepts every address
    pub is_catch_all: bool,
    /// `true`, `false` or `unknown`
    pub deliverable: String,
    /// Mailbox rejected for quota
    pub is_mailbox_full: bool,
    /// Role account such as `sales@`
    pub is_role_account: bool,
    /// Generated by a system
    pub is_system_generated: bool,
    /// Free provider such as gmail
    pub is_free_account: bool,
    /// SMTP dialogue succeeded
    pub smtp_success: bool,
    /// SMTP response code
    pub response_code: String,
    /// Validator error code
    pub error_code: String,
    /// Validator description
    pub description: String,
    /// Domain is the primary domain of its organization
    pub is_primary_domain: bool,
    /// Primary domain of the organization
    pub primary_domain: String,
    /// Suggested replacement address
    pub alternate_email: String,
    /// Validation should be retried later
    pub retry_validation: bool,
    /// Validation time
    pub validated_at: Option<DateTime<Utc>>,
}

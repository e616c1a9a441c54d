//! Phone number payloads.

use super::Source;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `V1_PHONE_NUMBER_CREATE`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PhoneNumberCreateEvent {
    /// Tenant
    pub tenant: String,
    /// Number as entered
    pub raw_phone_number: String,
    /// Origin
    pub source: Source,
    /// Creation time
    pub created_at: Option<DateTime<Utc>>,
    /// Update time
    pub updated_at: Option<DateTime<Utc>>,
}

/// `V1_PHONE_NUMBER_UPDATE`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PhoneNumberUpdateEvent {
    /// Tenant
    pub tenant: String,
    /// Number as entered
    pub raw_phone_number: String,
    /// Origin
    pub source: Source,
    /// Update time
    pub updated_at: Option<DateTime<Utc>>,
}

/// `V1_PHONE_NUMBER_VALIDATION_FAILED`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PhoneNumberValidationFailedEvent {
    /// Tenant
    pub tenant: String,
    /// Number as entered
    pub raw_phone_number: String,
    /// Country used for validation
    pub country_code_a2: String,
    /// Validator message
    pub validation_error: String,
    /// Validation time
    pub validated_at: Option<DateTime<Utc>>,
}

/// `V1_PHONE_NUMBER_VALIDATED`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PhoneNumberValidatedEvent {
    /// Tenant
    pub tenant: String,
    /// Number as entered
    pub raw_phone_number: String,
    /// Country code the number resolved to
    pub country_code_a2: String,
    /// Normalized number
    pub e164: String,
    /// Validation time
    pub validated_at: Option<DateTime<Utc>>,
}

//! Location and job role payloads.

use super::Source;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Structured postal address.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[allow(missing_docs)]
pub struct LocationAddress {
    pub country: String,
    pub country_code_a2: String,
    pub country_code_a3: String,
    pub region: String,
    pub district: String,
    pub locality: String,
    pub street: String,
    pub address1: String,
    pub address2: String,
    pub zip: String,
    pub address_type: String,
    pub house_number: String,
    pub postal_code: String,
    pub plus_four: String,
    pub commercial: bool,
    pub predirection: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub time_zone: String,
    pub utc_offset: Option<f64>,
}

impl LocationAddress {
    /// Whether every component is blank.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.country.is_empty()
            && self.region.is_empty()
            && self.locality.is_empty()
            && self.street.is_empty()
            && self.address1.is_empty()
            && self.zip.is_empty()
            && self.postal_code.is_empty()
    }
}

/// `V1_LOCATION_CREATE`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LocationCreateEvent {
    /// Tenant
    pub tenant: String,
    /// Location name
    pub name: String,
    /// Raw address as entered
    pub raw_address: String,
    /// Structured address
    pub location_address: LocationAddress,
    /// Origin
    pub source: Source,
    /// Creation time
    pub created_at: Option<DateTime<Utc>>,
    /// Update time
    pub updated_at: Option<DateTime<Utc>>,
}

/// `V1_LOCATION_UPDATE`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LocationUpdateEvent {
    /// Tenant
    pub tenant: String,
    /// Location name
    pub name: String,
    /// Raw address
    pub raw_address: String,
    /// Structured address
    pub location_address: LocationAddress,
    /// Origin of the update
    pub source: String,
    /// Update time
    pub updated_at: Option<DateTime<Utc>>,
}

/// `V1_LOCATION_VALIDATION_FAILED`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LocationValidationFailedEvent {
    /// Tenant
    pub tenant: String,
    /// Raw address
    pub raw_address: String,
    /// Country used for validation
    pub country: String,
    /// Validator message
    pub validation_error: String,
    /// Validation time
    pub validated_at: Option<DateTime<Utc>>,
}

/// `V1_LOCATION_VALIDATED`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LocationValidatedEvent {
    /// Tenant
    pub tenant: String,
    /// Raw address
    pub raw_address: String,
    /// Country used for validation
    pub country_for_validation: String,
    /// Normalized address
    pub location_address: LocationAddress,
    /// Validation time
    pub validated_at: Option<DateTime<Utc>>,
}

/// `V1_JOB_ROLE_CREATE`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobRoleCreateEvent {
    /// Tenant
    pub tenant: String,
    /// Job title
    pub job_title: String,
    /// Description
    pub description: String,
    /// Start of the role
    pub start_date: Option<DateTime<Utc>>,
    /// End of the role
    pub end_date: Option<DateTime<Utc>>,
    /// Origin
    pub source: Source,
    /// Creation time
    pub created_at: Option<DateTime<Utc>>,
}

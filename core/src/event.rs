//! Stored event envelope and aggregate object id resolution.
//!
//! Every message delivered by a persistent subscription wraps one
//! [`StoredEvent`]: the aggregate stream id, the versioned event type string,
//! the JSON payload and the tracing metadata written by the command side.
//!
//! # Aggregate ids
//!
//! Aggregate stream ids encode the aggregate type, the tenant and the entity
//! uuid:
//!
//! ```text
//! organization-acme-3f1c2a4e-9b0d-4c55-8f7e-2d7a1b9c0e11
//! └────┬─────┘ └┬─┘ └───────────────┬────────────────┘
//!  aggregate   tenant            object id (graph node id)
//! ```
//!
//! The graph store only ever sees the object id. [`aggregate_object_id`]
//! derives it and is the idempotency key for every MERGE a handler issues.
//!
//! # Example
//!
//! ```
//! use crm_projections_core::event::{aggregate_object_id, AggregateType};
//!
//! let id = aggregate_object_id(
//!     "contract-acme-0b7cbe3f-4a0e-4e5c-9d9f-1b2c3d4e5f60",
//!     "acme",
//!     AggregateType::Contract,
//! );
//! assert_eq!(id, "0b7cbe3f-4a0e-4e5c-9d9f-1b2c3d4e5f60");
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Prefix of the broker's own bookkeeping streams.
pub const INTERNAL_STREAM_PREFIX: &str = "$";

/// Error types for envelope and payload handling.
#[derive(Error, Debug)]
pub enum EventError {
    /// The payload is not valid JSON for the expected type.
    #[error("Failed to decode payload of {event_type}: {reason}")]
    Decode {
        /// Event type being decoded
        event_type: String,
        /// Decoder message
        reason: String,
    },

    /// The envelope could not be encoded for transport.
    #[error("Failed to encode event: {0}")]
    Encode(String),
}

/// Aggregate families whose streams feed the projections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateType {
    /// Organization aggregate
    Organization,
    /// Contact aggregate
    Contact,
    /// Contract aggregate
    Contract,
    /// Email aggregate
    Email,
    /// User aggregate
    User,
    /// Opportunity aggregate
    Opportunity,
    /// Service line item aggregate
    ServiceLineItem,
    /// Invoice aggregate
    Invoice,
    /// Tenant aggregate (bank accounts and settings live here too)
    Tenant,
    /// Comment aggregate
    Comment,
    /// Issue aggregate
    Issue,
    /// Log entry aggregate
    LogEntry,
    /// Location aggregate
    Location,
    /// Job role aggregate
    JobRole,
    /// Phone number aggregate
    PhoneNumber,
    /// Reminder aggregate
    Reminder,
    /// Stream of system-wide notifications
    System,
}

impl AggregateType {
    /// Prefix used in aggregate stream ids.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Organization => "organization",
            Self::Contact => "contact",
            Self::Contract => "contract",
            Self::Email => "email",
            Self::User => "user",
            Self::Opportunity => "opportunity",
            Self::ServiceLineItem => "service_line_item",
            Self::Invoice => "invoice",
            Self::Tenant => "tenant",
            Self::Comment => "comment",
            Self::Issue => "issue",
            Self::LogEntry => "log_entry",
            Self::Location => "location",
            Self::JobRole => "job_role",
            Self::PhoneNumber => "phone_number",
            Self::Reminder => "reminder",
            Self::System => "system",
        }
    }
}

impl fmt::Display for AggregateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derive the graph object id from an aggregate stream id.
///
/// With a tenant, every `"{aggregate_type}-{tenant}-"` fragment is removed.
/// Without one, the trailing uuid (five dash separated groups) is returned,
/// or the id unchanged when it is too short to hold a uuid.
#[must_use]
pub fn aggregate_object_id(
    aggregate_id: &str,
    tenant: &str,
    aggregate_type: AggregateType,
) -> String {
    if tenant.is_empty() {
        return trailing_uuid(aggregate_id);
    }
    let prefix = format!("{}-{tenant}-", aggregate_type.as_str());
    aggregate_id.replace(&prefix, "")
}

fn trailing_uuid(aggregate_id: &str) -> String {
    let parts: Vec<&str> = aggregate_id.split('-').collect();
    if parts.len() < 5 {
        return aggregate_id.to_string();
    }
    parts[parts.len() - 5..].join("-")
}

/// Delivery order marker assigned by the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct EventPosition {
    /// Commit position in the global log
    pub commit: u64,
    /// Prepare position in the global log
    pub prepare: u64,
}

impl EventPosition {
    /// Create a position.
    #[must_use]
    pub const fn new(commit: u64, prepare: u64) -> Self {
        Self { commit, prepare }
    }
}

/// An event as recorded in the event store and delivered to a subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredEvent {
    /// Unique id of the recorded event
    pub event_id: String,
    /// Stream id, e.g. `organization-acme-<uuid>`
    pub aggregate_id: String,
    /// Versioned event type string, e.g. `V1_ORGANIZATION_CREATE`
    pub event_type: String,
    /// JSON payload
    #[serde(with = "json_bytes")]
    pub data: Vec<u8>,
    /// JSON text-map carrying the originating trace context
    #[serde(default, with = "opt_json_bytes")]
    pub metadata: Option<Vec<u8>>,
    /// Broker position
    #[serde(default)]
    pub position: EventPosition,
    /// When the event was appended
    pub created_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct TenantField {
    #[serde(default)]
    tenant: String,
}

impl StoredEvent {
    /// Create a new event envelope with a JSON payload.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Encode`] if the payload cannot be serialized.
    pub fn new<T: Serialize>(
        aggregate_id: impl Into<String>,
        event_type: impl Into<String>,
        data: &T,
    ) -> Result<Self, EventError> {
        let data = serde_json::to_vec(data).map_err(|e| EventError::Encode(e.to_string()))?;
        Ok(Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            aggregate_id: aggregate_id.into(),
            event_type: event_type.into(),
            data,
            metadata: None,
            position: EventPosition::default(),
            created_at: Utc::now(),
        })
    }

    /// Attach trace metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: &HashMap<String, String>) -> Self {
        self.metadata = serde_json::to_vec(metadata).ok();
        self
    }

    /// Set the broker position.
    #[must_use]
    pub const fn with_position(mut self, position: EventPosition) -> Self {
        self.position = position;
        self
    }

    /// Whether this event belongs to one of the broker's internal streams.
    #[must_use]
    pub fn is_internal(&self) -> bool {
        self.aggregate_id.starts_with(INTERNAL_STREAM_PREFIX)
    }

    /// Tenant named in the payload, empty when absent or unreadable.
    #[must_use]
    pub fn tenant(&self) -> String {
        serde_json::from_slice::<TenantField>(&self.data)
            .map(|t| t.tenant)
            .unwrap_or_default()
    }

    /// Metadata parsed as a text-map carrier. Invalid metadata yields an empty map.
    #[must_use]
    pub fn metadata_carrier(&self) -> HashMap<String, String> {
        self.metadata
            .as_deref()
            .and_then(|raw| serde_json::from_slice(raw).ok())
            .unwrap_or_default()
    }

    /// Decode the payload into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Decode`] if the JSON does not match `T`.
    pub fn json_data<T: serde::de::DeserializeOwned>(&self) -> Result<T, EventError> {
        serde_json::from_slice(&self.data).map_err(|e| EventError::Decode {
            event_type: self.event_type.clone(),
            reason: e.to_string(),
        })
    }
}

impl fmt::Display for StoredEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StoredEvent {{ type: {}, aggregate: {}, position: {} }}",
            self.event_type, self.aggregate_id, self.position.commit
        )
    }
}

// Payload bytes travel as embedded JSON, not as a byte array.
mod json_bytes {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        let value: serde_json::Value =
            serde_json::from_slice(bytes).map_err(serde::ser::Error::custom)?;
        value.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        serde_json::to_vec(&value).map_err(serde::de::Error::custom)
    }
}

mod opt_json_bytes {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(
        bytes: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let value: Option<serde_json::Value> = match bytes {
            Some(raw) => Some(serde_json::from_slice(raw).map_err(serde::ser::Error::custom)?),
            None => None,
        };
        value.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        let value = Option::<serde_json::Value>::deserialize(deserializer)?;
        value
            .map(|v| serde_json::to_vec(&v).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn object_id_strips_type_and_tenant() {
        let id = aggregate_object_id(
            "organization-acme-3f1c2a4e-9b0d-4c55-8f7e-2d7a1b9c0e11",
            "acme",
            AggregateType::Organization,
        );
        assert_eq!(id, "3f1c2a4e-9b0d-4c55-8f7e-2d7a1b9c0e11");
    }

    #[test]
    fn object_id_without_tenant_takes_trailing_uuid() {
        let id = aggregate_object_id(
            "service_line_item-acme-3f1c2a4e-9b0d-4c55-8f7e-2d7a1b9c0e11",
            "",
            AggregateType::ServiceLineItem,
        );
        assert_eq!(id, "3f1c2a4e-9b0d-4c55-8f7e-2d7a1b9c0e11");
    }

    #[test]
    fn object_id_short_id_is_returned_unchanged() {
        assert_eq!(aggregate_object_id("abc-def", "", AggregateType::Issue), "abc-def");
    }

    #[test]
    fn object_id_with_other_tenant_is_left_alone() {
        let raw = "issue-other-3f1c2a4e-9b0d-4c55-8f7e-2d7a1b9c0e11";
        assert_eq!(aggregate_object_id(raw, "acme", AggregateType::Issue), raw);
    }

    #[test]
    fn tenant_is_read_from_payload() {
        let event = StoredEvent::new(
            "contact-acme-1",
            "V1_CONTACT_LOCATION_LINK",
            &serde_json::json!({"tenant": "acme", "locationId": "l1"}),
        )
        .unwrap();
        assert_eq!(event.tenant(), "acme");
        assert!(!event.is_internal());
    }

    #[test]
    fn internal_streams_are_detected() {
        let event = StoredEvent::new("$ce-organization", "$>", &serde_json::json!({})).unwrap();
        assert!(event.is_internal());
        assert_eq!(event.tenant(), "");
    }

    #[test]
    fn invalid_metadata_yields_empty_carrier() {
        let mut event = StoredEvent::new("a", "b", &serde_json::json!({})).unwrap();
        event.metadata = Some(b"not json".to_vec());
        assert!(event.metadata_carrier().is_empty());
    }

    #[test]
    fn envelope_round_trips_through_json_with_embedded_payload() {
        let mut carrier = HashMap::new();
        carrier.insert("traceparent".to_string(), "00-abc-def-01".to_string());
        let event = StoredEvent::new("a", "V1_X", &serde_json::json!({"tenant": "t"}))
            .unwrap()
            .with_metadata(&carrier);

        let text = serde_json::to_string(&event).unwrap();
        assert!(text.contains("\"data\":{\"tenant\":\"t\"}"));

        let back: StoredEvent = serde_json::from_str(&text).unwrap();
        assert_eq!(back.metadata_carrier(), carrier);
        assert_eq!(back.tenant(), "t");
    }

    proptest! {
        #[test]
        fn object_id_is_stable_for_generated_ids(
            tenant in "[a-z]{1,12}",
            uuid in "[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}",
        ) {
            let aggregate_id = format!("contract-{tenant}-{uuid}");
            prop_assert_eq!(
                aggregate_object_id(&aggregate_id, &tenant, AggregateType::Contract),
                uuid.clone()
            );
            prop_assert_eq!(aggregate_object_id(&aggregate_id, "", AggregateType::Contract), uuid);
        }
    }
}

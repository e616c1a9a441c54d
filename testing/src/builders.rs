//! Event builders for tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::missing_panics_doc)]

use crm_projections_core::event::StoredEvent;
use crm_projections_core::event_kind::EventKind;
use serde_json::Value;

/// Stream id of an aggregate, e.g. `contract-acme-c1`.
#[must_use]
pub fn aggregate_id(kind: EventKind, tenant: &str, entity_id: &str) -> String {
    format!("{}-{tenant}-{entity_id}", kind.aggregate_type().as_str())
}

/// Event of `kind` on `entity_id` with `payload`; `tenant` is added to the payload.
#[must_use]
pub fn event(kind: EventKind, tenant: &str, entity_id: &str, payload: Value) -> StoredEvent {
    let mut payload = payload;
    if let Value::Object(map) = &mut payload {
        map.insert("tenant".to_string(), Value::String(tenant.to_string()));
    }
    StoredEvent::new(aggregate_id(kind, tenant, entity_id), kind.as_str(), &payload).unwrap()
}

/// Event carrying only the tenant.
#[must_use]
pub fn bare_event(kind: EventKind, tenant: &str, entity_id: &str) -> StoredEvent {
    event(kind, tenant, entity_id, serde_json::json!({}))
}

/// Event with an arbitrary type string.
#[must_use]
pub fn raw_event(aggregate_id: &str, event_type: &str, payload: Value) -> StoredEvent {
    StoredEvent::new(aggregate_id, event_type, &payload).unwrap()
}

//! Location projections.

use super::{GraphContext, at_or_now};
use async_trait::async_trait;
use crm_projections_core::events::{
    EventPayload, LocationAddress, LocationCreateEvent, LocationUpdateEvent, LocationValidatedEvent,
    LocationValidationFailedEvent,
};
use crm_projections_core::graph::{NodeLabel, NodeRef, Properties};
use crm_projections_core::handler::{DecodedEvent, Handler, HandlerError};

/// Projects location events.
#[derive(Debug, Clone)]
pub struct LocationEventHandler {
    ctx: GraphContext,
}

impl LocationEventHandler {
    /// Create the handler.
    #[must_use]
    pub const fn new(ctx: GraphContext) -> Self {
        Self { ctx }
    }

    async fn on_create(
        &self,
        event: &DecodedEvent,
        data: &LocationCreateEvent,
    ) -> Result<(), HandlerError> {
        let node = NodeRef::new(NodeLabel::Location, event.object_id.as_str());
        let created_at = at_or_now(data.created_at, &self.ctx);
        let mut on_create = self.ctx.source_properties(&data.source);
        on_create.set("createdAt", created_at);
        on_create.set("syncedWithEventStore", true);

        let mut props = address_properties(&data.location_address);
        props.set("name", data.name.as_str());
        props.set("rawAddress", data.raw_address.as_str());
        props.set("updatedAt", data.updated_at.unwrap_or(created_at));

        self.ctx.graph.merge_node(&event.tenant, &node, on_create, props).await?;
        Ok(())
    }

    async fn on_update(
        &self,
        event: &DecodedEvent,
        data: &LocationUpdateEvent,
    ) -> Result<(), HandlerError> {
        let node = NodeRef::new(NodeLabel::Location, event.object_id.as_str());
        let mut props = address_properties(&data.location_address);
        props.set("name", data.name.as_str());
        props.set("rawAddress", data.raw_address.as_str());
        props.set("updatedAt", at_or_now(data.updated_at, &self.ctx));
        if !data.source.is_empty() {
            props.set("sourceOfTruth", data.source.as_str());
        }
        self.ctx.graph.update_node(&event.tenant, &node, props).await?;
        Ok(())
    }

    async fn on_validation_failed(
        &self,
        event: &DecodedEvent,
        data: &LocationValidationFailedEvent,
    ) -> Result<(), HandlerError> {
        let node = NodeRef::new(NodeLabel::Location, event.object_id.as_str());
        let props = Properties::new()
            .with("validated", false)
            .with("validationError", data.validation_error.as_str())
            .with("updatedAt", at_or_now(data.validated_at, &self.ctx));
        self.ctx.graph.update_node(&event.tenant, &node, props).await?;
        Ok(())
    }

    async fn on_validated(
        &self,
        event: &DecodedEvent,
        data: &LocationValidatedEvent,
    ) -> Result<(), HandlerError> {
        let node = NodeRef::new(NodeLabel::Location, event.object_id.as_str());
        let mut props = address_properties(&data.location_address);
        props.set("validated", true);
        props.set("updatedAt", at_or_now(data.validated_at, &self.ctx));
        self.ctx.graph.update_node(&event.tenant, &node, props).await?;
        Ok(())
    }
}

/// Graph properties of a structured address. Coordinates are written only when known.
pub(crate) fn address_properties(address: &LocationAddress) -> Properties {
    let mut props = Properties::new()
        .with("country", address.country.as_str())
        .with("countryCodeA2", address.country_code_a2.as_str())
        .with("countryCodeA3", address.country_code_a3.as_str())
        .with("region", address.region.as_str())
        .with("district", address.district.as_str())
        .with("locality", address.locality.as_str())
        .with("street", address.street.as_str())
        .with("address", address.address1.as_str())
        .with("address2", address.address2.as_str())
        .with("zip", address.zip.as_str())
        .with("addressType", address.address_type.as_str())
        .with("houseNumber", address.house_number.as_str())
        .with("postalCode", address.postal_code.as_str())
        .with("plusFour", address.plus_four.as_str())
        .with("commercial", address.commercial)
        .with("predirection", address.predirection.as_str())
        .with("timeZone", address.time_zone.as_str());
    if let Some(latitude) = address.latitude {
        props.set("latitude", latitude);
    }
    if let Some(longitude) = address.longitude {
        props.set("longitude", longitude);
    }
    if let Some(offset) = address.utc_offset {
        props.set("utcOffset", offset);
    }
    props
}

#[async_trait]
impl Handler for LocationEventHandler {
    fn name(&self) -> &'static str {
        "LocationEventHandler"
    }

    async fn handle(&self, event: &DecodedEvent) -> Result<(), HandlerError> {
        match &event.payload {
            EventPayload::LocationCreate(data) => self.on_create(event, data).await,
            EventPayload::LocationUpdate(data) => self.on_update(event, data).await,
            EventPayload::LocationValidationFailed(data) => {
                self.on_validation_failed(event, data).await
            }
            EventPayload::LocationValidated(data) => self.on_validated(event, data).await,
            other => Err(HandlerError::unexpected(self.name(), other)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::graph::test_support::{decoded, harness};
    use crm_projections_core::event_kind::EventKind;
    use crm_projections_testing::builders;
    use serde_json::json;

    #[tokio::test]
    async fn create_then_validate_fills_the_address() {
        let h = harness();
        let handler = LocationEventHandler::new(h.ctx.clone());
        let node = NodeRef::new(NodeLabel::Location, "l1");

        let create = builders::event(
            EventKind::LocationCreate,
            "acme",
            "l1",
            json!({"rawAddress": "1 Main St, Springfield", "source": {"source": "hubspot"}}),
        );
        handler.handle(&decoded(&create)).await.unwrap();

        let validated = builders::event(
            EventKind::LocationValidated,
            "acme",
            "l1",
            json!({
                "rawAddress": "1 Main St, Springfield",
                "locationAddress": {"country": "US", "locality": "Springfield", "latitude": 39.8}
            }),
        );
        handler.handle(&decoded(&validated)).await.unwrap();

        let props = h.graph.node("acme", &node).unwrap();
        assert_eq!(props.string("rawAddress"), "1 Main St, Springfield");
        assert_eq!(props.string("country"), "US");
        assert_eq!(props.get_f64("latitude"), Some(39.8));
        assert!(props.get("longitude").is_none());
        assert_eq!(props.get_bool("validated"), Some(true));
        assert_eq!(props.string("source"), "hubspot");
    }

    #[tokio::test]
    async fn validation_failure_is_recorded() {
        let h = harness();
        let handler = LocationEventHandler::new(h.ctx.clone());
        let node = NodeRef::new(NodeLabel::Location, "l1");
        h.graph.seed("acme", &node, Properties::new());

        let failed = builders::event(
            EventKind::LocationValidationFailed,
            "acme",
            "l1",
            json!({"validationError": "address not found"}),
        );
        handler.handle(&decoded(&failed)).await.unwrap();

        let props = h.graph.node("acme", &node).unwrap();
        assert_eq!(props.get_bool("validated"), Some(false));
        assert_eq!(props.string("validationError"), "address not found");
    }
}

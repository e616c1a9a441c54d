//! Phone number projections.

use super::{GraphContext, at_or_now};
use async_trait::async_trait;
use crm_projections_core::events::{
    EventPayload, PhoneNumberCreateEvent, PhoneNumberUpdateEvent, PhoneNumberValidatedEvent,
    PhoneNumberValidationFailedEvent,
};
use crm_projections_core::graph::{NodeLabel, NodeRef, Properties, PropertyValue};
use crm_projections_core::handler::{DecodedEvent, Handler, HandlerError};
use crm_projections_core::notifier::EventCompleted;

/// Projects phone number events.
#[derive(Debug, Clone)]
pub struct PhoneNumberEventHandler {
    ctx: GraphContext,
}

impl PhoneNumberEventHandler {
    /// Create the handler.
    #[must_use]
    pub const fn new(ctx: GraphContext) -> Self {
        Self { ctx }
    }

    async fn on_create(
        &self,
        event: &DecodedEvent,
        data: &PhoneNumberCreateEvent,
    ) -> Result<(), HandlerError> {
        let node = NodeRef::new(NodeLabel::PhoneNumber, event.object_id.as_str());
        let created_at = at_or_now(data.created_at, &self.ctx);
        let mut on_create = self.ctx.source_properties(&data.source);
        on_create.set("createdAt", created_at);
        on_create.set("syncedWithEventStore", true);

        self.ctx
            .graph
            .merge_node(
                &event.tenant,
                &node,
                on_create,
                Properties::new()
                    .with("rawPhoneNumber", data.raw_phone_number.as_str())
                    .with("updatedAt", data.updated_at.unwrap_or(created_at)),
            )
            .await?;
        Ok(())
    }

    async fn on_update(
        &self,
        event: &DecodedEvent,
        data: &PhoneNumberUpdateEvent,
    ) -> Result<(), HandlerError> {
        let node = NodeRef::new(NodeLabel::PhoneNumber, event.object_id.as_str());
        let mut props = Properties::new().with("updatedAt", at_or_now(data.updated_at, &self.ctx));
        // Source of truth changes only through an explicit source
        if !data.source.source_of_truth.is_empty() {
            props.set("sourceOfTruth", data.source.source_of_truth.as_str());
        }
        if !data.raw_phone_number.is_empty() {
            props.set("rawPhoneNumber", data.raw_phone_number.as_str());
            // The raw number changed, the previous validation no longer holds
            props.set("validated", PropertyValue::Null);
            props.set("e164", PropertyValue::Null);
        }

        self.ctx.graph.update_node(&event.tenant, &node, props).await?;
        self.ctx
            .notify(EventCompleted::update(&event.tenant, NodeLabel::PhoneNumber, &event.object_id))
            .await;
        Ok(())
    }

    async fn on_validation_failed(
        &self,
        event: &DecodedEvent,
        data: &PhoneNumberValidationFailedEvent,
    ) -> Result<(), HandlerError> {
        let node = NodeRef::new(NodeLabel::PhoneNumber, event.object_id.as_str());
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
        data: &PhoneNumberValidatedEvent,
    ) -> Result<(), HandlerError> {
        let node = NodeRef::new(NodeLabel::PhoneNumber, event.object_id.as_str());
        let props = Properties::new()
            .with("validated", true)
            .with("e164", data.e164.as_str())
            .with("validationError", PropertyValue::Null)
            .with("updatedAt", at_or_now(data.validated_at, &self.ctx));
        self.ctx.graph.update_node(&event.tenant, &node, props).await?;
        self.ctx
            .notify(EventCompleted::update(&event.tenant, NodeLabel::PhoneNumber, &event.object_id))
            .await;
        Ok(())
    }
}

#[async_trait]
impl Handler for PhoneNumberEventHandler {
    fn name(&self) -> &'static str {
        "PhoneNumberEventHandler"
    }

    async fn handle(&self, event: &DecodedEvent) -> Result<(), HandlerError> {
        match &event.payload {
            EventPayload::PhoneNumberCreate(data) => self.on_create(event, data).await,
            EventPayload::PhoneNumberUpdate(data) => self.on_update(event, data).await,
            EventPayload::PhoneNumberValidationFailed(data) => {
                self.on_validation_failed(event, data).await
            }
            EventPayload::PhoneNumberValidated(data) => self.on_validated(event, data).await,
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
    async fn create_then_validate() {
        let h = harness();
        let handler = PhoneNumberEventHandler::new(h.ctx.clone());
        let node = NodeRef::new(NodeLabel::PhoneNumber, "p1");

        let create = builders::event(
            EventKind::PhoneNumberCreate,
            "acme",
            "p1",
            json!({"rawPhoneNumber": "+1 555 0100", "source": {"source": "openline"}}),
        );
        handler.handle(&decoded(&create)).await.unwrap();
        handler.handle(&decoded(&create)).await.unwrap();
        assert_eq!(h.graph.count(NodeLabel::PhoneNumber), 1);

        let validated = builders::event(
            EventKind::PhoneNumberValidated,
            "acme",
            "p1",
            json!({"rawPhoneNumber": "+1 555 0100", "e164": "+15550100"}),
        );
        handler.handle(&decoded(&validated)).await.unwrap();

        let props = h.graph.node("acme", &node).unwrap();
        assert_eq!(props.string("rawPhoneNumber"), "+1 555 0100");
        assert_eq!(props.string("e164"), "+15550100");
        assert_eq!(props.get_bool("validated"), Some(true));
        assert_eq!(props.string("sourceOfTruth"), "openline");
        assert_eq!(h.notifier.notified().len(), 1);
    }

    #[tokio::test]
    async fn new_raw_number_resets_validation() {
        let h = harness();
        let handler = PhoneNumberEventHandler::new(h.ctx.clone());
        let node = NodeRef::new(NodeLabel::PhoneNumber, "p1");
        h.graph.seed(
            "acme",
            &node,
            Properties::new()
                .with("rawPhoneNumber", "old")
                .with("validated", true)
                .with("e164", "+1"),
        );

        let update = builders::event(
            EventKind::PhoneNumberUpdate,
            "acme",
            "p1",
            json!({"rawPhoneNumber": "new"}),
        );
        handler.handle(&decoded(&update)).await.unwrap();

        let props = h.graph.node("acme", &node).unwrap();
        assert_eq!(props.string("rawPhoneNumber"), "new");
        assert!(props.get("validated").is_none());
        assert!(props.get("e164").is_none());
    }

    #[tokio::test]
    async fn validation_failure_is_recorded() {
        let h = harness();
        let handler = PhoneNumberEventHandler::new(h.ctx.clone());
        let node = NodeRef::new(NodeLabel::PhoneNumber, "p1");
        h.graph.seed("acme", &node, Properties::new());

        let failed = builders::event(
            EventKind::PhoneNumberValidationFailed,
            "acme",
            "p1",
            json!({"validationError": "invalid number"}),
        );
        handler.handle(&decoded(&failed)).await.unwrap();

        let props = h.graph.node("acme", &node).unwrap();
        assert_eq!(props.get_bool("validated"), Some(false));
        assert_eq!(props.string("validationError"), "invalid number");
    }
}

//! Contact projections.

use super::GraphContext;
use async_trait::async_trait;
use crm_projections_core::events::{EventPayload, LinkLocationEvent, LinkPhoneNumberEvent};
use crm_projections_core::graph::{NodeLabel, NodeRef, Properties, RelationshipType};
use crm_projections_core::handler::{DecodedEvent, Handler, HandlerError};
use crm_projections_core::notifier::EventCompleted;

/// Projects contact link events.
#[derive(Debug, Clone)]
pub struct ContactEventHandler {
    ctx: GraphContext,
}

impl ContactEventHandler {
    /// Create the handler.
    #[must_use]
    pub const fn new(ctx: GraphContext) -> Self {
        Self { ctx }
    }

    async fn on_phone_number_link(
        &self,
        event: &DecodedEvent,
        data: &LinkPhoneNumberEvent,
    ) -> Result<(), HandlerError> {
        let contact = NodeRef::new(NodeLabel::Contact, event.object_id.as_str());
        self.ctx
            .link_phone_number(
                &event.tenant,
                &contact,
                &data.phone_number_id,
                data.primary,
                &data.label,
            )
            .await?;
        self.ctx
            .notify(EventCompleted::update(&event.tenant, NodeLabel::Contact, &event.object_id))
            .await;
        Ok(())
    }

    async fn on_location_link(
        &self,
        event: &DecodedEvent,
        data: &LinkLocationEvent,
    ) -> Result<(), HandlerError> {
        let contact = NodeRef::new(NodeLabel::Contact, event.object_id.as_str());
        let location = NodeRef::new(NodeLabel::Location, data.location_id.as_str());
        self.ctx
            .link(
                &event.tenant,
                &contact,
                RelationshipType::AssociatedWith,
                &location,
                Properties::new(),
            )
            .await?;
        self.ctx
            .notify(EventCompleted::update(&event.tenant, NodeLabel::Contact, &event.object_id))
            .await;
        Ok(())
    }
}

#[async_trait]
impl Handler for ContactEventHandler {
    fn name(&self) -> &'static str {
        "ContactEventHandler"
    }

    async fn handle(&self, event: &DecodedEvent) -> Result<(), HandlerError> {
        match &event.payload {
            EventPayload::ContactPhoneNumberLink(data) => {
                self.on_phone_number_link(event, data).await
            }
            EventPayload::ContactLocationLink(data) => self.on_location_link(event, data).await,
            other => Err(HandlerError::unexpected(self.name(), other)),
        }
    }
}

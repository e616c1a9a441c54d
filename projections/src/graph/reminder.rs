//! Reminder projections.

use super::{GraphContext, at_or_now};
use async_trait::async_trait;
use crm_projections_core::events::{
    EventPayload, ReminderCreateEvent, ReminderUpdateEvent, mask_allows,
};
use crm_projections_core::graph::{NodeLabel, NodeRef, Properties, RelationshipType};
use crm_projections_core::handler::{DecodedEvent, Handler, HandlerError};
use crm_projections_core::notifier::EventCompleted;

/// Projects reminder events.
#[derive(Debug, Clone)]
pub struct ReminderEventHandler {
    ctx: GraphContext,
}

impl ReminderEventHandler {
    /// Create the handler.
    #[must_use]
    pub const fn new(ctx: GraphContext) -> Self {
        Self { ctx }
    }

    async fn on_create(
        &self,
        event: &DecodedEvent,
        data: &ReminderCreateEvent,
    ) -> Result<(), HandlerError> {
        let reminder = NodeRef::new(NodeLabel::Reminder, event.object_id.as_str());
        let created_at = at_or_now(data.created_at, &self.ctx);
        let mut on_create = self.ctx.source_properties(&data.source);
        on_create.set("createdAt", created_at);

        let props = Properties::new()
            .with("content", data.content.as_str())
            .with("dueDate", data.due_date)
            .with("dismissed", data.dismissed)
            .with("updatedAt", created_at);
        self.ctx.graph.merge_node(&event.tenant, &reminder, on_create, props).await?;

        if !data.user_id.is_empty() {
            let user = NodeRef::new(NodeLabel::User, data.user_id.as_str());
            self.ctx
                .link(
                    &event.tenant,
                    &reminder,
                    RelationshipType::ReminderBelongsToUser,
                    &user,
                    Properties::new(),
                )
                .await?;
        }
        if !data.organization_id.is_empty() {
            let organization = NodeRef::new(NodeLabel::Organization, data.organization_id.as_str());
            self.ctx
                .link(
                    &event.tenant,
                    &reminder,
                    RelationshipType::ReminderBelongsToOrganization,
                    &organization,
                    Properties::new(),
                )
                .await?;
        }

        self.ctx
            .notify(EventCompleted::create(&event.tenant, NodeLabel::Reminder, &event.object_id))
            .await;
        Ok(())
    }

    async fn on_update(
        &self,
        event: &DecodedEvent,
        data: &ReminderUpdateEvent,
    ) -> Result<(), HandlerError> {
        let reminder = NodeRef::new(NodeLabel::Reminder, event.object_id.as_str());
        let mask = &data.fields_mask;
        let props = Properties::new()
            .with_if(mask_allows(mask, "content"), "content", data.content.as_str())
            .with_if(mask_allows(mask, "dueDate"), "dueDate", data.due_date)
            .with_if(mask_allows(mask, "dismissed"), "dismissed", data.dismissed)
            .with("updatedAt", at_or_now(data.updated_at, &self.ctx));
        self.ctx.graph.update_node(&event.tenant, &reminder, props).await?;
        self.ctx
            .notify(EventCompleted::update(&event.tenant, NodeLabel::Reminder, &event.object_id))
            .await;
        Ok(())
    }
}

#[async_trait]
impl Handler for ReminderEventHandler {
    fn name(&self) -> &'static str {
        "ReminderEventHandler"
    }

    async fn handle(&self, event: &DecodedEvent) -> Result<(), HandlerError> {
        match &event.payload {
            EventPayload::ReminderCreate(data) => self.on_create(event, data).await,
            EventPayload::ReminderUpdate(data) => self.on_update(event, data).await,
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
    async fn reminder_belongs_to_user_and_organization() {
        let h = harness();
        let handler = ReminderEventHandler::new(h.ctx.clone());
        let reminder = NodeRef::new(NodeLabel::Reminder, "r1");
        let user = NodeRef::new(NodeLabel::User, "u1");
        let org = NodeRef::new(NodeLabel::Organization, "o1");
        h.graph.seed("acme", &user, Properties::new());
        h.graph.seed("acme", &org, Properties::new());

        let create = builders::event(
            EventKind::ReminderCreate,
            "acme",
            "r1",
            json!({"content": "Call back", "userId": "u1", "organizationId": "o1"}),
        );
        handler.handle(&decoded(&create)).await.unwrap();
        assert!(h.graph.has_edge(
            "acme",
            &reminder,
            RelationshipType::ReminderBelongsToUser,
            &user,
        ));
        assert!(h.graph.has_edge(
            "acme",
            &reminder,
            RelationshipType::ReminderBelongsToOrganization,
            &org,
        ));

        let update = builders::event(
            EventKind::ReminderUpdate,
            "acme",
            "r1",
            json!({"content": "", "dismissed": true, "fieldsMask": ["dismissed"]}),
        );
        handler.handle(&decoded(&update)).await.unwrap();
        let props = h.graph.node("acme", &reminder).unwrap();
        assert_eq!(props.string("content"), "Call back");
        assert_eq!(props.get_bool("dismissed"), Some(true));
    }
}

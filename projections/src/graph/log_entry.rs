//! Log entry projections.

use super::{GraphContext, at_or_now};
use async_trait::async_trait;
use crm_projections_core::events::{EventPayload, LogEntryCreateEvent, LogEntryUpdateEvent};
use crm_projections_core::graph::{NodeLabel, NodeRef, Properties, RelationshipType};
use crm_projections_core::handler::{DecodedEvent, Handler, HandlerError};

/// Projects log entry events.
#[derive(Debug, Clone)]
pub struct LogEntryEventHandler {
    ctx: GraphContext,
}

impl LogEntryEventHandler {
    /// Create the handler.
    #[must_use]
    pub const fn new(ctx: GraphContext) -> Self {
        Self { ctx }
    }

    async fn link_organization(
        &self,
        tenant: &str,
        entry: &NodeRef,
        organization_id: &str,
    ) -> Result<(), HandlerError> {
        if organization_id.is_empty() {
            return Ok(());
        }
        let organization = NodeRef::new(NodeLabel::Organization, organization_id);
        self.ctx
            .link(tenant, &organization, RelationshipType::Logged, entry, Properties::new())
            .await?;
        Ok(())
    }

    async fn on_create(
        &self,
        event: &DecodedEvent,
        data: &LogEntryCreateEvent,
    ) -> Result<(), HandlerError> {
        let entry = NodeRef::new(NodeLabel::LogEntry, event.object_id.as_str());
        let created_at = at_or_now(data.created_at, &self.ctx);
        let mut on_create = self.ctx.source_properties(&data.source);
        on_create.set("createdAt", created_at);
        on_create.set("syncedWithEventStore", true);

        let props = Properties::new()
            .with("content", data.content.as_str())
            .with("contentType", data.content_type.as_str())
            .with("startedAt", data.started_at.unwrap_or(created_at))
            .with("updatedAt", data.updated_at.unwrap_or(created_at));
        self.ctx.graph.merge_node(&event.tenant, &entry, on_create, props).await?;

        self.link_organization(&event.tenant, &entry, &data.logged_organization_id)
            .await?;
        if !data.author_user_id.is_empty() {
            let author = NodeRef::new(NodeLabel::User, data.author_user_id.as_str());
            self.ctx
                .link(
                    &event.tenant,
                    &entry,
                    RelationshipType::CreatedBy,
                    &author,
                    Properties::new(),
                )
                .await?;
        }
        self.ctx
            .link_external_system(&event.tenant, &entry, &data.external_system)
            .await?;
        Ok(())
    }

    async fn on_update(
        &self,
        event: &DecodedEvent,
        data: &LogEntryUpdateEvent,
    ) -> Result<(), HandlerError> {
        let entry = NodeRef::new(NodeLabel::LogEntry, event.object_id.as_str());
        let mut props = Properties::new()
            .with("content", data.content.as_str())
            .with("contentType", data.content_type.as_str())
            .with("updatedAt", at_or_now(data.updated_at, &self.ctx));
        if let Some(started_at) = data.started_at {
            props.set("startedAt", started_at);
        }
        if !data.source_of_truth.is_empty() {
            props.set("sourceOfTruth", data.source_of_truth.as_str());
        }
        self.ctx.graph.update_node(&event.tenant, &entry, props).await?;
        self.link_organization(&event.tenant, &entry, &data.logged_organization_id)
            .await
    }
}

#[async_trait]
impl Handler for LogEntryEventHandler {
    fn name(&self) -> &'static str {
        "LogEntryEventHandler"
    }

    async fn handle(&self, event: &DecodedEvent) -> Result<(), HandlerError> {
        match &event.payload {
            EventPayload::LogEntryCreate(data) => self.on_create(event, data).await,
            EventPayload::LogEntryUpdate(data) => self.on_update(event, data).await,
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
    use crm_projections_core::environment::Clock;
    use crm_projections_testing::{builders, test_clock};
    use serde_json::json;

    #[tokio::test]
    async fn create_links_organization_and_author() {
        let h = harness();
        let handler = LogEntryEventHandler::new(h.ctx.clone());
        let org = NodeRef::new(NodeLabel::Organization, "o1");
        let user = NodeRef::new(NodeLabel::User, "u1");
        let entry = NodeRef::new(NodeLabel::LogEntry, "le1");
        h.graph.seed("acme", &org, Properties::new());
        h.graph.seed("acme", &user, Properties::new());

        let create = builders::event(
            EventKind::LogEntryCreate,
            "acme",
            "le1",
            json!({
                "content": "Called the CFO",
                "contentType": "text/plain",
                "loggedOrganizationId": "o1",
                "authorUserId": "u1",
                "source": {"source": "openline"}
            }),
        );
        handler.handle(&decoded(&create)).await.unwrap();

        assert_eq!(h.graph.node("acme", &entry).unwrap().string("content"), "Called the CFO");
        assert!(h.graph.has_edge("acme", &org, RelationshipType::Logged, &entry));
        assert!(h.graph.has_edge("acme", &entry, RelationshipType::CreatedBy, &user));
    }

    #[tokio::test]
    async fn update_keeps_start_when_absent() {
        let h = harness();
        let handler = LogEntryEventHandler::new(h.ctx.clone());
        let entry = NodeRef::new(NodeLabel::LogEntry, "le1");
        let started = test_clock().now();
        h.graph.seed("acme", &entry, Properties::new().with("startedAt", started));

        let update = builders::event(
            EventKind::LogEntryUpdate,
            "acme",
            "le1",
            json!({"content": "Called the CEO"}),
        );
        handler.handle(&decoded(&update)).await.unwrap();

        let props = h.graph.node("acme", &entry).unwrap();
        assert_eq!(props.string("content"), "Called the CEO");
        assert_eq!(props.get_datetime("startedAt"), Some(started));
    }
}

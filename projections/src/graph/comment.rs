//! Comment projections.

use super::{GraphContext, at_or_now};
use async_trait::async_trait;
use crm_projections_core::events::{CommentCreateEvent, CommentUpdateEvent, EventPayload};
use crm_projections_core::graph::{NodeLabel, NodeRef, Properties, RelationshipType};
use crm_projections_core::handler::{DecodedEvent, Handler, HandlerError};

/// Projects comment events.
#[derive(Debug, Clone)]
pub struct CommentEventHandler {
    ctx: GraphContext,
}

impl CommentEventHandler {
    /// Create the handler.
    #[must_use]
    pub const fn new(ctx: GraphContext) -> Self {
        Self { ctx }
    }

    async fn on_create(
        &self,
        event: &DecodedEvent,
        data: &CommentCreateEvent,
    ) -> Result<(), HandlerError> {
        let comment = NodeRef::new(NodeLabel::Comment, event.object_id.as_str());
        let created_at = at_or_now(data.created_at, &self.ctx);
        let mut on_create = self.ctx.source_properties(&data.source);
        on_create.set("createdAt", created_at);
        on_create.set("syncedWithEventStore", true);

        let props = Properties::new()
            .with("content", data.content.as_str())
            .with("contentType", data.content_type.as_str())
            .with("updatedAt", data.updated_at.unwrap_or(created_at));
        self.ctx.graph.merge_node(&event.tenant, &comment, on_create, props).await?;

        if !data.commented_issue_id.is_empty() {
            let issue = NodeRef::new(NodeLabel::Issue, data.commented_issue_id.as_str());
            self.ctx
                .link(
                    &event.tenant,
                    &comment,
                    RelationshipType::Commented,
                    &issue,
                    Properties::new(),
                )
                .await?;
        }
        if !data.author_user_id.is_empty() {
            let author = NodeRef::new(NodeLabel::User, data.author_user_id.as_str());
            self.ctx
                .link(
                    &event.tenant,
                    &comment,
                    RelationshipType::CreatedBy,
                    &author,
                    Properties::new(),
                )
                .await?;
        }
        self.ctx
            .link_external_system(&event.tenant, &comment, &data.external_system)
            .await?;
        Ok(())
    }

    async fn on_update(
        &self,
        event: &DecodedEvent,
        data: &CommentUpdateEvent,
    ) -> Result<(), HandlerError> {
        let comment = NodeRef::new(NodeLabel::Comment, event.object_id.as_str());
        let mut props = Properties::new()
            .with("content", data.content.as_str())
            .with("contentType", data.content_type.as_str())
            .with("updatedAt", at_or_now(data.updated_at, &self.ctx));
        if !data.source.is_empty() {
            props.set("sourceOfTruth", data.source.as_str());
        }
        self.ctx.graph.update_node(&event.tenant, &comment, props).await?;
        self.ctx
            .link_external_system(&event.tenant, &comment, &data.external_system)
            .await
    }
}

#[async_trait]
impl Handler for CommentEventHandler {
    fn name(&self) -> &'static str {
        "CommentEventHandler"
    }

    async fn handle(&self, event: &DecodedEvent) -> Result<(), HandlerError> {
        match &event.payload {
            EventPayload::CommentCreate(data) => self.on_create(event, data).await,
            EventPayload::CommentUpdate(data) => self.on_update(event, data).await,
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
    async fn comment_is_attached_to_its_issue() {
        let h = harness();
        let handler = CommentEventHandler::new(h.ctx.clone());
        let issue = NodeRef::new(NodeLabel::Issue, "i1");
        let comment = NodeRef::new(NodeLabel::Comment, "c1");
        h.graph.seed("acme", &issue, Properties::new());

        let create = builders::event(
            EventKind::CommentCreate,
            "acme",
            "c1",
            json!({"content": "Looking into it", "commentedIssueId": "i1"}),
        );
        handler.handle(&decoded(&create)).await.unwrap();
        assert!(h.graph.has_edge("acme", &comment, RelationshipType::Commented, &issue));

        let update = builders::event(
            EventKind::CommentUpdate,
            "acme",
            "c1",
            json!({"content": "Fixed", "source": "zendesk"}),
        );
        handler.handle(&decoded(&update)).await.unwrap();
        let props = h.graph.node("acme", &comment).unwrap();
        assert_eq!(props.string("content"), "Fixed");
        assert_eq!(props.string("sourceOfTruth"), "zendesk");
    }
}

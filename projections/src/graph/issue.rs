//! Issue projections.

use super::{GraphContext, at_or_now};
use async_trait::async_trait;
use crm_projections_core::events::{
    EventPayload, IssueCreateEvent, IssueUpdateEvent, IssueUserEvent,
};
use crm_projections_core::graph::{NodeLabel, NodeRef, Properties, RelationshipType};
use crm_projections_core::handler::{DecodedEvent, Handler, HandlerError};
use crm_projections_core::notifier::EventCompleted;

/// Projects issue events.
#[derive(Debug, Clone)]
pub struct IssueEventHandler {
    ctx: GraphContext,
}

impl IssueEventHandler {
    /// Create the handler.
    #[must_use]
    pub const fn new(ctx: GraphContext) -> Self {
        Self { ctx }
    }

    fn node(event: &DecodedEvent) -> NodeRef {
        NodeRef::new(NodeLabel::Issue, event.object_id.as_str())
    }

    async fn on_create(
        &self,
        event: &DecodedEvent,
        data: &IssueCreateEvent,
    ) -> Result<(), HandlerError> {
        let issue = Self::node(event);
        let created_at = at_or_now(data.created_at, &self.ctx);
        let mut on_create = self.ctx.source_properties(&data.source);
        on_create.set("createdAt", created_at);
        on_create.set("syncedWithEventStore", true);

        let props = Properties::new()
            .with("subject", data.subject.as_str())
            .with("description", data.description.as_str())
            .with("status", data.status.as_str())
            .with("priority", data.priority.as_str())
            .with("updatedAt", data.updated_at.unwrap_or(created_at));
        self.ctx.graph.merge_node(&event.tenant, &issue, on_create, props).await?;

        let parties = [
            (
                RelationshipType::ReportedBy,
                NodeLabel::Organization,
                &data.reported_by_organization_id,
            ),
            (
                RelationshipType::SubmittedBy,
                NodeLabel::Organization,
                &data.submitted_by_organization_id,
            ),
            (RelationshipType::SubmittedBy, NodeLabel::User, &data.submitted_by_user_id),
        ];
        for (rel, label, id) in parties {
            if id.is_empty() {
                continue;
            }
            self.ctx
                .link(
                    &event.tenant,
                    &issue,
                    rel,
                    &NodeRef::new(label, id.as_str()),
                    Properties::new(),
                )
                .await?;
        }
        self.ctx
            .link_external_system(&event.tenant, &issue, &data.external_system)
            .await?;
        Ok(())
    }

    async fn on_update(
        &self,
        event: &DecodedEvent,
        data: &IssueUpdateEvent,
    ) -> Result<(), HandlerError> {
        let issue = Self::node(event);
        let mut props = Properties::new()
            .with("subject", data.subject.as_str())
            .with("description", data.description.as_str())
            .with("status", data.status.as_str())
            .with("priority", data.priority.as_str())
            .with("updatedAt", at_or_now(data.updated_at, &self.ctx));
        if !data.source.is_empty() {
            props.set("sourceOfTruth", data.source.as_str());
        }
        self.ctx.graph.update_node(&event.tenant, &issue, props).await?;
        self.ctx
            .link_external_system(&event.tenant, &issue, &data.external_system)
            .await?;
        self.ctx
            .notify(EventCompleted::update(&event.tenant, NodeLabel::Issue, &event.object_id))
            .await;
        Ok(())
    }

    async fn on_user(
        &self,
        event: &DecodedEvent,
        data: &IssueUserEvent,
        rel: RelationshipType,
        add: bool,
    ) -> Result<(), HandlerError> {
        let issue = Self::node(event);
        let user = NodeRef::new(NodeLabel::User, data.user_id.as_str());
        if add {
            self.ctx
                .link(
                    &event.tenant,
                    &issue,
                    rel,
                    &user,
                    Properties::new().with("createdAt", at_or_now(data.at, &self.ctx)),
                )
                .await?;
        } else {
            self.ctx.graph.delete_relationship(&event.tenant, &issue, rel, &user).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Handler for IssueEventHandler {
    fn name(&self) -> &'static str {
        "IssueEventHandler"
    }

    async fn handle(&self, event: &DecodedEvent) -> Result<(), HandlerError> {
        match &event.payload {
            EventPayload::IssueCreate(data) => self.on_create(event, data).await,
            EventPayload::IssueUpdate(data) => self.on_update(event, data).await,
            EventPayload::IssueAddUserAssignee(data) => {
                self.on_user(event, data, RelationshipType::AssignedTo, true).await
            }
            EventPayload::IssueRemoveUserAssignee(data) => {
                self.on_user(event, data, RelationshipType::AssignedTo, false).await
            }
            EventPayload::IssueAddUserFollower(data) => {
                self.on_user(event, data, RelationshipType::FollowedBy, true).await
            }
            EventPayload::IssueRemoveUserFollower(data) => {
                self.on_user(event, data, RelationshipType::FollowedBy, false).await
            }
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
    async fn create_links_reporter_and_submitter() {
        let h = harness();
        let handler = IssueEventHandler::new(h.ctx.clone());
        let issue = NodeRef::new(NodeLabel::Issue, "i1");
        let org = NodeRef::new(NodeLabel::Organization, "o1");
        let user = NodeRef::new(NodeLabel::User, "u1");
        h.graph.seed("acme", &org, Properties::new());
        h.graph.seed("acme", &user, Properties::new());

        let create = builders::event(
            EventKind::IssueCreate,
            "acme",
            "i1",
            json!({
                "subject": "Login broken",
                "status": "open",
                "reportedByOrganizationId": "o1",
                "submittedByUserId": "u1"
            }),
        );
        handler.handle(&decoded(&create)).await.unwrap();

        assert!(h.graph.has_edge("acme", &issue, RelationshipType::ReportedBy, &org));
        assert!(h.graph.has_edge("acme", &issue, RelationshipType::SubmittedBy, &user));
        assert!(!h.graph.has_edge("acme", &issue, RelationshipType::SubmittedBy, &org));
    }

    #[tokio::test]
    async fn assignee_and_follower_come_and_go() {
        let h = harness();
        let handler = IssueEventHandler::new(h.ctx.clone());
        let issue = NodeRef::new(NodeLabel::Issue, "i1");
        let user = NodeRef::new(NodeLabel::User, "u1");
        h.graph.seed("acme", &issue, Properties::new());
        h.graph.seed("acme", &user, Properties::new());

        for kind in [EventKind::IssueAddUserAssignee, EventKind::IssueAddUserFollower] {
            let add = builders::event(kind, "acme", "i1", json!({"userId": "u1"}));
            handler.handle(&decoded(&add)).await.unwrap();
        }
        assert!(h.graph.has_edge("acme", &issue, RelationshipType::AssignedTo, &user));
        assert!(h.graph.has_edge("acme", &issue, RelationshipType::FollowedBy, &user));

        let remove = builders::event(
            EventKind::IssueRemoveUserAssignee,
            "acme",
            "i1",
            json!({"userId": "u1"}),
        );
        handler.handle(&decoded(&remove)).await.unwrap();
        assert!(!h.graph.has_edge("acme", &issue, RelationshipType::AssignedTo, &user));
        assert!(h.graph.has_edge("acme", &issue, RelationshipType::FollowedBy, &user));
    }
}

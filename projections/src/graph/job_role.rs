//! Job role projections.

use super::{GraphContext, at_or_now};
use async_trait::async_trait;
use crm_projections_core::events::{EventPayload, JobRoleCreateEvent};
use crm_projections_core::graph::{NodeLabel, NodeRef, Properties};
use crm_projections_core::handler::{DecodedEvent, Handler, HandlerError};

/// Projects job role events.
#[derive(Debug, Clone)]
pub struct JobRoleEventHandler {
    ctx: GraphContext,
}

impl JobRoleEventHandler {
    /// Create the handler.
    #[must_use]
    pub const fn new(ctx: GraphContext) -> Self {
        Self { ctx }
    }

    async fn on_create(
        &self,
        event: &DecodedEvent,
        data: &JobRoleCreateEvent,
    ) -> Result<(), HandlerError> {
        let node = NodeRef::new(NodeLabel::JobRole, event.object_id.as_str());
        let created_at = at_or_now(data.created_at, &self.ctx);
        let mut on_create = self.ctx.source_properties(&data.source);
        on_create.set("createdAt", created_at);
        on_create.set("syncedWithEventStore", true);

        let props = Properties::new()
            .with("jobTitle", data.job_title.as_str())
            .with("description", data.description.as_str())
            .with("startedAt", data.start_date)
            .with("endedAt", data.end_date)
            .with("updatedAt", created_at);
        self.ctx.graph.merge_node(&event.tenant, &node, on_create, props).await?;
        Ok(())
    }
}

#[async_trait]
impl Handler for JobRoleEventHandler {
    fn name(&self) -> &'static str {
        "JobRoleEventHandler"
    }

    async fn handle(&self, event: &DecodedEvent) -> Result<(), HandlerError> {
        match &event.payload {
            EventPayload::JobRoleCreate(data) => self.on_create(event, data).await,
            other => Err(HandlerError::unexpected(self.name(), other)),
        }
    }
}

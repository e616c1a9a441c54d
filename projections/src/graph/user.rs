//! User projections.

use super::{GraphContext, at_or_now};
use async_trait::async_trait;
use crm_projections_core::events::{
    EventPayload, LinkPhoneNumberEvent, UserCreateEvent, UserLinkJobRoleEvent, UserRoleEvent,
    UserUpdateEvent,
};
use crm_projections_core::graph::{NodeLabel, NodeRef, Properties, RelationshipType};
use crm_projections_core::handler::{DecodedEvent, Handler, HandlerError};
use crm_projections_core::notifier::EventCompleted;

/// Projects user events.
#[derive(Debug, Clone)]
pub struct UserEventHandler {
    ctx: GraphContext,
}

impl UserEventHandler {
    /// Create the handler.
    #[must_use]
    pub const fn new(ctx: GraphContext) -> Self {
        Self { ctx }
    }

    fn node(event: &DecodedEvent) -> NodeRef {
        NodeRef::new(NodeLabel::User, event.object_id.as_str())
    }

    async fn on_create(
        &self,
        event: &DecodedEvent,
        data: &UserCreateEvent,
    ) -> Result<(), HandlerError> {
        let created_at = at_or_now(data.created_at, &self.ctx);
        let mut on_create = self.ctx.source_properties(&data.source);
        on_create.set("createdAt", created_at);
        on_create.set("syncedWithEventStore", true);
        on_create.set("roles", Vec::<String>::new());

        let props = Properties::new()
            .with("name", data.name.as_str())
            .with("firstName", data.first_name.as_str())
            .with("lastName", data.last_name.as_str())
            .with("internal", data.internal)
            .with("bot", data.bot)
            .with("profilePhotoUrl", data.profile_photo_url.as_str())
            .with("timezone", data.timezone.as_str())
            .with("updatedAt", data.updated_at.unwrap_or(created_at));
        self.ctx
            .graph
            .merge_node(&event.tenant, &Self::node(event), on_create, props)
            .await?;
        Ok(())
    }

    async fn on_update(
        &self,
        event: &DecodedEvent,
        data: &UserUpdateEvent,
    ) -> Result<(), HandlerError> {
        let mut props = Properties::new()
            .with("name", data.name.as_str())
            .with("firstName", data.first_name.as_str())
            .with("lastName", data.last_name.as_str())
            .with("internal", data.internal)
            .with("bot", data.bot)
            .with("timezone", data.timezone.as_str())
            .with("updatedAt", at_or_now(data.updated_at, &self.ctx));
        // An empty photo url keeps the current one
        if !data.profile_photo_url.is_empty() {
            props.set("profilePhotoUrl", data.profile_photo_url.as_str());
        }
        if !data.source.is_empty() {
            props.set("sourceOfTruth", data.source.as_str());
        }
        self.ctx.graph.update_node(&event.tenant, &Self::node(event), props).await?;
        self.ctx
            .notify(EventCompleted::update(&event.tenant, NodeLabel::User, &event.object_id))
            .await;
        Ok(())
    }

    async fn on_phone_number_link(
        &self,
        event: &DecodedEvent,
        data: &LinkPhoneNumberEvent,
    ) -> Result<(), HandlerError> {
        self.ctx
            .link_phone_number(
                &event.tenant,
                &Self::node(event),
                &data.phone_number_id,
                data.primary,
                &data.label,
            )
            .await?;
        Ok(())
    }

    async fn on_job_role_link(
        &self,
        event: &DecodedEvent,
        data: &UserLinkJobRoleEvent,
    ) -> Result<(), HandlerError> {
        let job_role = NodeRef::new(NodeLabel::JobRole, data.job_role_id.as_str());
        self.ctx
            .link(
                &event.tenant,
                &Self::node(event),
                RelationshipType::WorksAs,
                &job_role,
                Properties::new(),
            )
            .await?;
        Ok(())
    }

    async fn on_role_change(
        &self,
        event: &DecodedEvent,
        data: &UserRoleEvent,
        add: bool,
    ) -> Result<(), HandlerError> {
        let node = Self::node(event);
        let Some(user) = self.ctx.graph.get_node(&event.tenant, &node).await? else {
            return Err(HandlerError::NotFound {
                entity: "User",
                id: event.object_id.clone(),
            });
        };

        let mut roles = user.properties.string_list("roles");
        let present = roles.iter().any(|r| *r == data.role);
        match (add, present) {
            (true, false) => roles.push(data.role.clone()),
            (false, true) => roles.retain(|r| *r != data.role),
            _ => return Ok(()),
        }

        let props = Properties::new()
            .with("roles", roles)
            .with("updatedAt", at_or_now(data.at, &self.ctx));
        self.ctx.graph.update_node(&event.tenant, &node, props).await?;
        Ok(())
    }
}

#[async_trait]
impl Handler for UserEventHandler {
    fn name(&self) -> &'static str {
        "UserEventHandler"
    }

    async fn handle(&self, event: &DecodedEvent) -> Result<(), HandlerError> {
        match &event.payload {
            EventPayload::UserCreate(data) => self.on_create(event, data).await,
            EventPayload::UserUpdate(data) => self.on_update(event, data).await,
            EventPayload::UserPhoneNumberLink(data) => self.on_phone_number_link(event, data).await,
            EventPayload::UserJobRoleLink(data) => self.on_job_role_link(event, data).await,
            EventPayload::UserAddRole(data) => self.on_role_change(event, data, true).await,
            EventPayload::UserRemoveRole(data) => self.on_role_change(event, data, false).await,
            other => Err(HandlerError::unexpected(self.name(), other)),
        }
    }
}

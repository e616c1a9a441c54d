//! Opportunity projections.
//!
//! Renewal opportunities hang off a contract through `ACTIVE_RENEWAL`; a
//! contract has at most one. Any change to a renewal's amount, date or
//! likelihood asks the owning organization to refresh its renewal summary
//! and ARR forecast.

use super::{GraphContext, at_or_now};
use async_trait::async_trait;
use crm_projections_core::events::{
    EventPayload, OpportunityCloseLostEvent, OpportunityCreateEvent, OpportunityCreateRenewalEvent,
    OpportunityUpdateEvent, OpportunityUpdateNextCycleDateEvent, OpportunityUpdateRenewalEvent,
    mask_allows,
};
use crm_projections_core::graph::{
    Direction, GraphNode, NodeLabel, NodeRef, Properties, RelationshipType,
};
use crm_projections_core::handler::{DecodedEvent, Handler, HandlerError};
use crm_projections_core::model::{Opportunity, opportunity_stage};
use crm_projections_core::notifier::EventCompleted;
use serde_json::json;

/// Timeline action recorded when a renewal's likelihood changes.
pub const ACTION_RENEWAL_LIKELIHOOD_UPDATED: &str = "RENEWAL_LIKELIHOOD_UPDATED";

/// Internal type of renewal opportunities.
pub const RENEWAL: &str = "RENEWAL";

/// Projects opportunity events.
#[derive(Debug, Clone)]
pub struct OpportunityEventHandler {
    ctx: GraphContext,
}

impl OpportunityEventHandler {
    /// Create the handler.
    #[must_use]
    pub const fn new(ctx: GraphContext) -> Self {
        Self { ctx }
    }

    fn node(event: &DecodedEvent) -> NodeRef {
        NodeRef::new(NodeLabel::Opportunity, event.object_id.as_str())
    }

    /// Organization of the contract this renewal belongs to.
    async fn renewal_organization(
        &self,
        tenant: &str,
        opportunity: &NodeRef,
    ) -> Result<Option<GraphNode>, HandlerError> {
        let contracts = self
            .ctx
            .graph
            .related(
                tenant,
                opportunity,
                RelationshipType::HasOpportunity,
                Direction::Incoming,
                NodeLabel::Contract,
            )
            .await?;
        match contracts.first() {
            Some(contract) => self.ctx.organization_of_contract(tenant, &contract.node.id).await,
            None => Ok(None),
        }
    }

    async fn refresh_owner(&self, tenant: &str, opportunity: &NodeRef) -> Result<(), HandlerError> {
        if let Some(organization) = self.renewal_organization(tenant, opportunity).await? {
            self.ctx.refresh_organization_renewals(tenant, &organization.id).await;
        }
        Ok(())
    }

    async fn set_owner(
        &self,
        tenant: &str,
        opportunity: &NodeRef,
        user_id: &str,
    ) -> Result<(), HandlerError> {
        let owners = self
            .ctx
            .graph
            .related(
                tenant,
                opportunity,
                RelationshipType::Owns,
                Direction::Incoming,
                NodeLabel::User,
            )
            .await?;
        for previous in owners.iter().filter(|o| o.node.id != user_id) {
            self.ctx
                .graph
                .delete_relationship(
                    tenant,
                    &previous.node.node_ref(),
                    RelationshipType::Owns,
                    opportunity,
                )
                .await?;
        }
        if !user_id.is_empty() {
            let user = NodeRef::new(NodeLabel::User, user_id);
            self.ctx
                .link(tenant, &user, RelationshipType::Owns, opportunity, Properties::new())
                .await?;
        }
        Ok(())
    }

    async fn on_create(
        &self,
        event: &DecodedEvent,
        data: &OpportunityCreateEvent,
    ) -> Result<(), HandlerError> {
        let opportunity = Self::node(event);
        let created_at = at_or_now(data.created_at, &self.ctx);
        let mut on_create = self.ctx.source_properties(&data.source);
        on_create.set("createdAt", created_at);
        on_create.set("syncedWithEventStore", true);

        let props = Properties::new()
            .with("name", data.name.as_str())
            .with("amount", data.amount)
            .with("maxAmount", data.max_amount)
            .with("internalType", data.internal_type.as_str())
            .with("externalType", data.external_type.as_str())
            .with("internalStage", data.internal_stage.as_str())
            .with("externalStage", data.external_stage.as_str())
            .with("estimatedClosedAt", data.estimated_closed_at)
            .with("generalNotes", data.general_notes.as_str())
            .with("nextSteps", data.next_steps.as_str())
            .with("currency", data.currency.as_str())
            .with("likelihoodRate", data.likelihood_rate)
            .with("updatedAt", data.updated_at.unwrap_or(created_at));
        self.ctx.graph.merge_node(&event.tenant, &opportunity, on_create, props).await?;

        if !data.organization_id.is_empty() {
            let organization = NodeRef::new(NodeLabel::Organization, data.organization_id.as_str());
            self.ctx
                .link(
                    &event.tenant,
                    &organization,
                    RelationshipType::HasOpportunity,
                    &opportunity,
                    Properties::new(),
                )
                .await?;
        }
        self.set_owner(&event.tenant, &opportunity, &data.owner_user_id).await?;
        if !data.created_by_user_id.is_empty() {
            let creator = NodeRef::new(NodeLabel::User, data.created_by_user_id.as_str());
            self.ctx
                .link(
                    &event.tenant,
                    &opportunity,
                    RelationshipType::CreatedBy,
                    &creator,
                    Properties::new(),
                )
                .await?;
        }
        self.ctx
            .link_external_system(&event.tenant, &opportunity, &data.external_system)
            .await?;
        Ok(())
    }

    async fn on_update(
        &self,
        event: &DecodedEvent,
        data: &OpportunityUpdateEvent,
    ) -> Result<(), HandlerError> {
        let opportunity = Self::node(event);
        let mask = &data.fields_mask;
        let mut props = Properties::new()
            .with_if(mask_allows(mask, "name"), "name", data.name.as_str())
            .with_if(mask_allows(mask, "amount"), "amount", data.amount)
            .with_if(mask_allows(mask, "maxAmount"), "maxAmount", data.max_amount)
            .with_if(mask_allows(mask, "externalType"), "externalType", data.external_type.as_str())
            .with_if(
                mask_allows(mask, "externalStage"),
                "externalStage",
                data.external_stage.as_str(),
            )
            .with_if(
                mask_allows(mask, "internalStage"),
                "internalStage",
                data.internal_stage.as_str(),
            )
            .with_if(
                mask_allows(mask, "estimatedClosedAt"),
                "estimatedClosedAt",
                data.estimated_closed_at,
            )
            .with_if(mask_allows(mask, "currency"), "currency", data.currency.as_str())
            .with_if(mask_allows(mask, "likelihoodRate"), "likelihoodRate", data.likelihood_rate)
            .with("updatedAt", at_or_now(data.updated_at, &self.ctx));
        if !data.source.is_empty() {
            props.set("sourceOfTruth", data.source.as_str());
        }

        let Some(current) = self.ctx.graph.get_node(&event.tenant, &opportunity).await? else {
            tracing::warn!(
                tenant = %event.tenant,
                opportunity_id = %event.object_id,
                "Opportunity not projected yet"
            );
            return Ok(());
        };
        self.ctx.graph.update_node(&event.tenant, &opportunity, props).await?;
        if mask_allows(mask, "ownerUserId") && !data.owner_user_id.is_empty() {
            self.set_owner(&event.tenant, &opportunity, &data.owner_user_id).await?;
        }
        self.ctx
            .link_external_system(&event.tenant, &opportunity, &data.external_system)
            .await?;

        let amounts_changed = mask_allows(mask, "amount") || mask_allows(mask, "maxAmount");
        if Opportunity::from_node(&current).internal_type == RENEWAL && amounts_changed {
            self.refresh_owner(&event.tenant, &opportunity).await?;
        }
        self.ctx
            .notify(EventCompleted::update(&event.tenant, NodeLabel::Opportunity, &event.object_id))
            .await;
        Ok(())
    }

    async fn on_update_next_cycle_date(
        &self,
        event: &DecodedEvent,
        data: &OpportunityUpdateNextCycleDateEvent,
    ) -> Result<(), HandlerError> {
        let opportunity = Self::node(event);
        let props = Properties::new()
            .with("renewedAt", data.renewed_at)
            .with("updatedAt", at_or_now(data.updated_at, &self.ctx));
        self.ctx.graph.update_node(&event.tenant, &opportunity, props).await?;
        self.refresh_owner(&event.tenant, &opportunity).await
    }

    async fn on_create_renewal(
        &self,
        event: &DecodedEvent,
        data: &OpportunityCreateRenewalEvent,
    ) -> Result<(), HandlerError> {
        let opportunity = Self::node(event);
        let contract = NodeRef::new(NodeLabel::Contract, data.contract_id.as_str());
        let created_at = at_or_now(data.created_at, &self.ctx);
        let mut on_create = self.ctx.source_properties(&data.source);
        on_create.set("createdAt", created_at);
        on_create.set("syncedWithEventStore", true);
        on_create.set("internalType", RENEWAL);
        on_create.set(
            "internalStage",
            if data.internal_stage.is_empty() {
                opportunity_stage::OPEN
            } else {
                data.internal_stage.as_str()
            },
        );

        let props = Properties::new()
            .with("renewalLikelihood", data.renewal_likelihood.as_str())
            .with("renewalApproved", data.renewal_approved)
            .with("renewedAt", data.renewed_at)
            .with("renewalAdjustedRate", data.renewal_adjusted_rate)
            .with("updatedAt", data.updated_at.unwrap_or(created_at));
        self.ctx.graph.merge_node(&event.tenant, &opportunity, on_create, props).await?;

        // One active renewal per contract
        let active = self
            .ctx
            .graph
            .related(
                &event.tenant,
                &contract,
                RelationshipType::ActiveRenewal,
                Direction::Outgoing,
                NodeLabel::Opportunity,
            )
            .await?;
        for previous in active.iter().filter(|r| r.node.id != opportunity.id) {
            self.ctx
                .graph
                .delete_relationship(
                    &event.tenant,
                    &contract,
                    RelationshipType::ActiveRenewal,
                    &previous.node.node_ref(),
                )
                .await?;
        }
        self.ctx
            .link(
                &event.tenant,
                &contract,
                RelationshipType::HasOpportunity,
                &opportunity,
                Properties::new(),
            )
            .await?;
        self.ctx
            .link(
                &event.tenant,
                &contract,
                RelationshipType::ActiveRenewal,
                &opportunity,
                Properties::new(),
            )
            .await?;

        if let Some(organization) = self
            .ctx
            .organization_of_contract(&event.tenant, &data.contract_id)
            .await?
        {
            self.ctx
                .refresh_organization_renewals(&event.tenant, &organization.id)
                .await;
        }
        Ok(())
    }

    async fn on_update_renewal(
        &self,
        event: &DecodedEvent,
        data: &OpportunityUpdateRenewalEvent,
    ) -> Result<(), HandlerError> {
        let opportunity = Self::node(event);
        let Some(current) = self.ctx.graph.get_node(&event.tenant, &opportunity).await? else {
            tracing::warn!(
                tenant = %event.tenant,
                opportunity_id = %event.object_id,
                "Renewal not projected yet"
            );
            return Ok(());
        };
        let previous = Opportunity::from_node(&current);

        let mask = &data.fields_mask;
        let props = Properties::new()
            .with_if(
                mask_allows(mask, "renewalLikelihood"),
                "renewalLikelihood",
                data.renewal_likelihood.as_str(),
            )
            .with_if(mask_allows(mask, "amount"), "amount", data.amount)
            .with_if(mask_allows(mask, "comments"), "comments", data.comments.as_str())
            .with_if(mask_allows(mask, "renewalApproved"), "renewalApproved", data.renewal_approved)
            .with_if(mask_allows(mask, "renewedAt"), "renewedAt", data.renewed_at)
            .with_if(
                mask_allows(mask, "renewalAdjustedRate"),
                "renewalAdjustedRate",
                data.renewal_adjusted_rate,
            )
            .with("updatedAt", at_or_now(data.updated_at, &self.ctx));
        self.ctx.graph.update_node(&event.tenant, &opportunity, props).await?;
        if mask_allows(mask, "ownerUserId") && !data.owner_user_id.is_empty() {
            self.set_owner(&event.tenant, &opportunity, &data.owner_user_id).await?;
        }

        let organization = self.renewal_organization(&event.tenant, &opportunity).await?;
        let likelihood_changed = mask_allows(mask, "renewalLikelihood")
            && !data.renewal_likelihood.is_empty()
            && data.renewal_likelihood != previous.renewal_likelihood;
        if likelihood_changed {
            let author = self.user_name(&event.tenant, &data.updated_by_user_id).await?;
            let mut content = format!(
                "Renewal likelihood set to {}",
                capitalize(&data.renewal_likelihood)
            );
            if !author.is_empty() {
                content.push_str(" by ");
                content.push_str(&author);
            }
            let metadata = json!({
                "likelihood": data.renewal_likelihood,
                "reason": data.comments,
            });
            let target = organization
                .as_ref()
                .map_or_else(|| opportunity.clone(), GraphNode::node_ref);
            self.ctx
                .create_action(
                    &event.tenant,
                    &target,
                    ACTION_RENEWAL_LIKELIHOOD_UPDATED,
                    &content,
                    &metadata,
                )
                .await?;
        }

        if let Some(organization) = organization {
            self.ctx
                .refresh_organization_renewals(&event.tenant, &organization.id)
                .await;
        }
        self.ctx
            .notify(EventCompleted::update(&event.tenant, NodeLabel::Opportunity, &event.object_id))
            .await;
        Ok(())
    }

    async fn user_name(&self, tenant: &str, user_id: &str) -> Result<String, HandlerError> {
        if user_id.is_empty() {
            return Ok(String::new());
        }
        let user = self
            .ctx
            .graph
            .get_node(tenant, &NodeRef::new(NodeLabel::User, user_id))
            .await?;
        Ok(user.map(|u| {
            let name = u.properties.string("name");
            if name.is_empty() {
                format!("{} {}", u.properties.string("firstName"), u.properties.string("lastName"))
                    .trim()
                    .to_string()
            } else {
                name
            }
        })
        .unwrap_or_default())
    }

    async fn on_close_lost(
        &self,
        event: &DecodedEvent,
        data: &OpportunityCloseLostEvent,
    ) -> Result<(), HandlerError> {
        let opportunity = Self::node(event);
        let props = Properties::new()
            .with("internalStage", opportunity_stage::CLOSED_LOST)
            .with("closedAt", at_or_now(data.closed_at, &self.ctx))
            .with("updatedAt", at_or_now(data.updated_at, &self.ctx));
        self.ctx.graph.update_node(&event.tenant, &opportunity, props).await?;
        self.ctx
            .notify(EventCompleted::update(&event.tenant, NodeLabel::Opportunity, &event.object_id))
            .await;
        Ok(())
    }
}

/// `HIGH` as `High`.
fn capitalize(value: &str) -> String {
    let lower = value.to_lowercase();
    let mut chars = lower.chars();
    chars
        .next()
        .map(|first| first.to_uppercase().chain(chars).collect())
        .unwrap_or_default()
}

#[async_trait]
impl Handler for OpportunityEventHandler {
    fn name(&self) -> &'static str {
        "OpportunityEventHandler"
    }

    async fn handle(&self, event: &DecodedEvent) -> Result<(), HandlerError> {
        match &event.payload {
            EventPayload::OpportunityCreate(data) => self.on_create(event, data).await,
            EventPayload::OpportunityUpdate(data) => self.on_update(event, data).await,
            EventPayload::OpportunityUpdateNextCycleDate(data) => {
                self.on_update_next_cycle_date(event, data).await
            }
            EventPayload::OpportunityCreateRenewal(data) => {
                self.on_create_renewal(event, data).await
            }
            EventPayload::OpportunityUpdateRenewal(data) => {
                self.on_update_renewal(event, data).await
            }
            EventPayload::OpportunityCloseLost(data) => self.on_close_lost(event, data).await,
            other => Err(HandlerError::unexpected(self.name(), other)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::graph::test_support::{Harness, decoded, harness};
    use crm_projections_core::event_kind::EventKind;
    use crm_projections_testing::builders;

    fn seed_org_with_contract(h: &Harness) -> (NodeRef, NodeRef) {
        let org = NodeRef::new(NodeLabel::Organization, "o1");
        let contract = NodeRef::new(NodeLabel::Contract, "k1");
        h.graph.seed("acme", &org, Properties::new());
        h.graph.seed("acme", &contract, Properties::new());
        h.graph.seed_edge(
            "acme",
            &org,
            RelationshipType::HasContract,
            &contract,
            Properties::new(),
        );
        (org, contract)
    }

    #[tokio::test]
    async fn create_renewal_becomes_the_active_renewal() {
        let h = harness();
        let handler = OpportunityEventHandler::new(h.ctx.clone());
        let (_, contract) = seed_org_with_contract(&h);
        let old = NodeRef::new(NodeLabel::Opportunity, "r0");
        h.graph.seed("acme", &old, Properties::new());
        h.graph.seed_edge(
            "acme",
            &contract,
            RelationshipType::ActiveRenewal,
            &old,
            Properties::new(),
        );

        let create = builders::event(
            EventKind::OpportunityCreateRenewal,
            "acme",
            "r1",
            json!({"contractId": "k1", "renewalLikelihood": "HIGH"}),
        );
        handler.handle(&decoded(&create)).await.unwrap();

        let renewal = NodeRef::new(NodeLabel::Opportunity, "r1");
        assert!(h.graph.has_edge("acme", &contract, RelationshipType::ActiveRenewal, &renewal));
        assert!(!h.graph.has_edge("acme", &contract, RelationshipType::ActiveRenewal, &old));
        let props = h.graph.node("acme", &renewal).unwrap();
        assert_eq!(props.string("internalType"), "RENEWAL");
        assert_eq!(props.string("internalStage"), "OPEN");
        assert_eq!(
            h.commands.sent_names(),
            vec!["RefreshOrganizationRenewalSummary", "RefreshOrganizationArr"]
        );
    }

    #[tokio::test]
    async fn likelihood_change_records_action_on_organization() {
        let h = harness();
        let handler = OpportunityEventHandler::new(h.ctx.clone());
        let (org, contract) = seed_org_with_contract(&h);
        let renewal = NodeRef::new(NodeLabel::Opportunity, "r1");
        let user = NodeRef::new(NodeLabel::User, "u1");
        h.graph.seed(
            "acme",
            &renewal,
            Properties::new()
                .with("internalType", "RENEWAL")
                .with("renewalLikelihood", "HIGH"),
        );
        h.graph.seed("acme", &user, Properties::new().with("name", "Ada"));
        h.graph
            .seed_edge(
                "acme",
                &contract,
                RelationshipType::HasOpportunity,
                &renewal,
                Properties::new(),
            );

        let update = builders::event(
            EventKind::OpportunityUpdateRenewal,
            "acme",
            "r1",
            json!({
                "renewalLikelihood": "LOW",
                "comments": "Budget cuts",
                "updatedByUserId": "u1",
                "fieldsMask": ["renewalLikelihood", "comments"]
            }),
        );
        handler.handle(&decoded(&update)).await.unwrap();

        let actions = h
            .ctx
            .graph
            .related(
                "acme",
                &org,
                RelationshipType::ActionOn,
                Direction::Incoming,
                NodeLabel::Action,
            )
            .await
            .unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(
            actions[0].node.properties.string("content"),
            "Renewal likelihood set to Low by Ada"
        );
        assert_eq!(h.graph.node("acme", &renewal).unwrap().string("renewalLikelihood"), "LOW");
        assert_eq!(h.commands.sent().len(), 2);

        // Same likelihood again: no new action
        handler.handle(&decoded(&update)).await.unwrap();
        assert_eq!(h.graph.count(NodeLabel::Action), 1);
    }

    #[tokio::test]
    async fn create_sets_owner_and_organization() {
        let h = harness();
        let handler = OpportunityEventHandler::new(h.ctx.clone());
        let org = NodeRef::new(NodeLabel::Organization, "o1");
        let user = NodeRef::new(NodeLabel::User, "u1");
        h.graph.seed("acme", &org, Properties::new());
        h.graph.seed("acme", &user, Properties::new());

        let create = builders::event(
            EventKind::OpportunityCreate,
            "acme",
            "op1",
            json!({"name": "Upsell", "amount": 5000.0, "organizationId": "o1", "ownerUserId": "u1"}),
        );
        handler.handle(&decoded(&create)).await.unwrap();

        let opportunity = NodeRef::new(NodeLabel::Opportunity, "op1");
        assert!(h.graph.has_edge("acme", &org, RelationshipType::HasOpportunity, &opportunity));
        assert!(h.graph.has_edge("acme", &user, RelationshipType::Owns, &opportunity));
    }

    #[tokio::test]
    async fn close_lost_sets_stage() {
        let h = harness();
        let handler = OpportunityEventHandler::new(h.ctx.clone());
        let opportunity = NodeRef::new(NodeLabel::Opportunity, "op1");
        h.graph.seed("acme", &opportunity, Properties::new().with("internalStage", "OPEN"));

        let lost = builders::event(EventKind::OpportunityCloseLost, "acme", "op1", json!({}));
        handler.handle(&decoded(&lost)).await.unwrap();

        let props = h.graph.node("acme", &opportunity).unwrap();
        assert_eq!(props.string("internalStage"), "CLOSED_LOST");
        assert!(props.get_datetime("closedAt").is_some());
    }
}

//! Organization projections.
//!
//! Besides the organization's own fields, this handler owns the values the
//! organization derives from its contracts: the ARR forecast, the renewal
//! summary and the total lifetime value. Those are recomputed from the graph
//! whenever a contract, opportunity or service line item asks for it.

use super::location::address_properties;
use super::{GraphContext, at_or_now};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crm_projections_core::events::{
    BillingProfileCreateEvent, BillingProfileEmailEvent, BillingProfileLocationEvent,
    BillingProfileUpdateEvent, EventPayload, LinkLocationEvent, LinkPhoneNumberEvent,
    OrganizationAddLocationEvent, OrganizationAddParentEvent, OrganizationCreateEvent,
    OrganizationRemoveParentEvent, OrganizationRemoveSocialEvent, OrganizationUnlinkDomainEvent,
    OrganizationUpdateEvent, OrganizationUpdateOnboardingStatusEvent,
    OrganizationUpsertCustomFieldEvent, TenantOnlyEvent, mask_allows,
};
use crm_projections_core::graph::{
    Direction, NodeLabel, NodeRef, Properties, PropertyValue, RelationshipType,
};
use crm_projections_core::handler::{DecodedEvent, Handler, HandlerError};
use crm_projections_core::model::{Contract, Opportunity, Organization};
use crm_projections_core::notifier::EventCompleted;
use serde_json::json;

/// Timeline action recorded when the onboarding status changes.
pub const ACTION_ONBOARDING_STATUS_CHANGED: &str = "ONBOARDING_STATUS_CHANGED";

/// Organization fields shared by the create and update payloads, keyed by
/// graph property. Update masks use the same names.
macro_rules! organization_fields {
    ($data:expr) => {
        vec![
            ("name", PropertyValue::from($data.name.as_str())),
            ("hide", PropertyValue::from($data.hide)),
            ("description", PropertyValue::from($data.description.as_str())),
            ("website", PropertyValue::from($data.website.as_str())),
            ("industry", PropertyValue::from($data.industry.as_str())),
            ("subIndustry", PropertyValue::from($data.sub_industry.as_str())),
            ("industryGroup", PropertyValue::from($data.industry_group.as_str())),
            ("targetAudience", PropertyValue::from($data.target_audience.as_str())),
            ("valueProposition", PropertyValue::from($data.value_proposition.as_str())),
            ("isPublic", PropertyValue::from($data.is_public)),
            ("employees", PropertyValue::from($data.employees)),
            ("market", PropertyValue::from($data.market.as_str())),
            ("lastFundingRound", PropertyValue::from($data.last_funding_round.as_str())),
            ("lastFundingAmount", PropertyValue::from($data.last_funding_amount.as_str())),
            ("referenceId", PropertyValue::from($data.reference_id.as_str())),
            ("note", PropertyValue::from($data.note.as_str())),
            ("logoUrl", PropertyValue::from($data.logo_url.as_str())),
            ("iconUrl", PropertyValue::from($data.icon_url.as_str())),
            ("headquarters", PropertyValue::from($data.headquarters.as_str())),
            ("yearFounded", PropertyValue::from($data.year_founded)),
            ("yearlyRevenue", PropertyValue::from($data.yearly_revenue)),
            ("employeeGrowthRate", PropertyValue::from($data.employee_growth_rate.as_str())),
            ("slackChannelId", PropertyValue::from($data.slack_channel_id.as_str())),
            ("relationship", PropertyValue::from($data.relationship.as_str())),
            ("stage", PropertyValue::from($data.stage.as_str())),
        ]
    };
}

/// Projects organization events.
#[derive(Debug, Clone)]
pub struct OrganizationEventHandler {
    ctx: GraphContext,
}

impl OrganizationEventHandler {
    /// Create the handler.
    #[must_use]
    pub const fn new(ctx: GraphContext) -> Self {
        Self { ctx }
    }

    fn node(event: &DecodedEvent) -> NodeRef {
        NodeRef::new(NodeLabel::Organization, event.object_id.as_str())
    }

    async fn updated(&self, event: &DecodedEvent) {
        self.ctx
            .notify(EventCompleted::update(
                &event.tenant,
                NodeLabel::Organization,
                &event.object_id,
            ))
            .await;
    }

    async fn on_create(
        &self,
        event: &DecodedEvent,
        data: &OrganizationCreateEvent,
    ) -> Result<(), HandlerError> {
        let node = Self::node(event);
        let created_at = at_or_now(data.created_at, &self.ctx);
        let mut on_create = self.ctx.source_properties(&data.source);
        on_create.set("createdAt", created_at);
        on_create.set("syncedWithEventStore", true);
        on_create.set("leadSource", data.lead_source.as_str());
        for (key, value) in organization_fields!(data) {
            on_create.set(key, value);
        }

        self.ctx
            .graph
            .merge_node(
                &event.tenant,
                &node,
                on_create,
                Properties::new().with("updatedAt", data.updated_at.unwrap_or(created_at)),
            )
            .await?;
        self.ctx
            .link_external_system(&event.tenant, &node, &data.external_system)
            .await?;
        self.ctx
            .notify(EventCompleted::create(
                &event.tenant,
                NodeLabel::Organization,
                &event.object_id,
            ))
            .await;
        Ok(())
    }

    async fn on_update(
        &self,
        event: &DecodedEvent,
        data: &OrganizationUpdateEvent,
    ) -> Result<(), HandlerError> {
        let node = Self::node(event);
        let mut props = Properties::new().with("updatedAt", at_or_now(data.updated_at, &self.ctx));
        for (key, value) in organization_fields!(data) {
            if mask_allows(&data.fields_mask, key) {
                props.set(key, value);
            }
        }
        if !data.source.is_empty() {
            props.set("sourceOfTruth", data.source.as_str());
        }

        if !self.ctx.graph.update_node(&event.tenant, &node, props).await? {
            tracing::warn!(
                tenant = %event.tenant,
                organization_id = %event.object_id,
                "Organization not projected yet"
            );
            return Ok(());
        }
        self.ctx
            .link_external_system(&event.tenant, &node, &data.external_system)
            .await?;
        self.updated(event).await;
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
        self.updated(event).await;
        Ok(())
    }

    async fn on_location_link(
        &self,
        event: &DecodedEvent,
        data: &LinkLocationEvent,
    ) -> Result<(), HandlerError> {
        let location = NodeRef::new(NodeLabel::Location, data.location_id.as_str());
        self.ctx
            .link(
                &event.tenant,
                &Self::node(event),
                RelationshipType::AssociatedWith,
                &location,
                Properties::new(),
            )
            .await?;
        self.updated(event).await;
        Ok(())
    }

    async fn on_unlink_domain(
        &self,
        event: &DecodedEvent,
        data: &OrganizationUnlinkDomainEvent,
    ) -> Result<(), HandlerError> {
        let domain = NodeRef::new(NodeLabel::Domain, data.domain.to_lowercase());
        self.ctx
            .graph
            .delete_relationship(
                &event.tenant,
                &Self::node(event),
                RelationshipType::HasDomain,
                &domain,
            )
            .await?;
        self.updated(event).await;
        Ok(())
    }

    async fn on_remove_social(
        &self,
        event: &DecodedEvent,
        data: &OrganizationRemoveSocialEvent,
    ) -> Result<(), HandlerError> {
        let socials = self
            .ctx
            .graph
            .related(
                &event.tenant,
                &Self::node(event),
                RelationshipType::Has,
                Direction::Outgoing,
                NodeLabel::Social,
            )
            .await?;
        let removed = socials.iter().filter(|s| {
            if data.social_id.is_empty() {
                !data.url.is_empty() && s.node.properties.string("url") == data.url
            } else {
                s.node.id == data.social_id
            }
        });
        for social in removed {
            self.ctx.graph.delete_node(&event.tenant, &social.node.node_ref()).await?;
        }
        self.updated(event).await;
        Ok(())
    }

    async fn on_show(
        &self,
        event: &DecodedEvent,
        data: &TenantOnlyEvent,
    ) -> Result<(), HandlerError> {
        let props = Properties::new()
            .with("hide", false)
            .with("updatedAt", at_or_now(data.updated_at, &self.ctx));
        self.ctx.graph.update_node(&event.tenant, &Self::node(event), props).await?;
        self.updated(event).await;
        Ok(())
    }

    /// Open renewals of the organization's contracts that still run.
    async fn active_renewals(
        &self,
        tenant: &str,
        organization: &NodeRef,
    ) -> Result<Vec<Opportunity>, HandlerError> {
        let now = self.ctx.now();
        let contracts = self
            .ctx
            .graph
            .related(
                tenant,
                organization,
                RelationshipType::HasContract,
                Direction::Outgoing,
                NodeLabel::Contract,
            )
            .await?;
        let mut renewals = Vec::new();
        for contract in contracts {
            let model = Contract::from_node(&contract.node);
            if model.deleted || model.is_ended(now) {
                continue;
            }
            let opportunities = self
                .ctx
                .graph
                .related(
                    tenant,
                    &contract.node.node_ref(),
                    RelationshipType::ActiveRenewal,
                    Direction::Outgoing,
                    NodeLabel::Opportunity,
                )
                .await?;
            renewals.extend(
                opportunities
                    .iter()
                    .map(|o| Opportunity::from_node(&o.node))
                    .filter(Opportunity::is_open_renewal),
            );
        }
        Ok(renewals)
    }

    async fn on_refresh_arr(&self, event: &DecodedEvent) -> Result<(), HandlerError> {
        let node = Self::node(event);
        let renewals = self.active_renewals(&event.tenant, &node).await?;
        let arr: f64 = renewals.iter().map(|o| o.amount).sum();
        let max_arr: f64 = renewals.iter().map(|o| o.max_amount).sum();

        let props = Properties::new()
            .with("renewalForecastArr", arr)
            .with("renewalForecastMaxArr", max_arr)
            .with("updatedAt", self.ctx.now());
        self.ctx.graph.update_node(&event.tenant, &node, props).await?;
        self.updated(event).await;
        Ok(())
    }

    async fn on_refresh_renewal_summary(&self, event: &DecodedEvent) -> Result<(), HandlerError> {
        let node = Self::node(event);
        let now = self.ctx.now();
        let renewals = self.active_renewals(&event.tenant, &node).await?;

        let next_renewal_at: Option<DateTime<Utc>> = renewals
            .iter()
            .filter_map(|o| o.renewed_at)
            .filter(|at| *at > now)
            .min();
        let lowest = renewals
            .iter()
            .filter(|o| !o.renewal_likelihood.is_empty())
            .min_by_key(|o| likelihood_order(&o.renewal_likelihood));

        let props = Properties::new()
            .with("derivedNextRenewalAt", next_renewal_at)
            .with("derivedRenewalLikelihood", lowest.map(|o| o.renewal_likelihood.as_str()))
            .with(
                "derivedRenewalLikelihoodOrder",
                lowest.map(|o| likelihood_order(&o.renewal_likelihood)),
            )
            .with("updatedAt", now);
        self.ctx.graph.update_node(&event.tenant, &node, props).await?;
        self.updated(event).await;
        Ok(())
    }

    async fn on_refresh_derived_data(&self, event: &DecodedEvent) -> Result<(), HandlerError> {
        let node = Self::node(event);
        let contracts = self
            .ctx
            .graph
            .related(
                &event.tenant,
                &node,
                RelationshipType::HasContract,
                Direction::Outgoing,
                NodeLabel::Contract,
            )
            .await?;
        let ltv: f64 = contracts
            .iter()
            .map(|c| Contract::from_node(&c.node))
            .filter(|c| !c.deleted)
            .map(|c| c.ltv)
            .sum();

        let props = Properties::new()
            .with("derivedLtv", crm_projections_core::contract::truncate_two_decimals(ltv))
            .with("updatedAt", self.ctx.now());
        self.ctx.graph.update_node(&event.tenant, &node, props).await?;
        self.updated(event).await;
        Ok(())
    }

    async fn on_upsert_custom_field(
        &self,
        event: &DecodedEvent,
        data: &OrganizationUpsertCustomFieldEvent,
    ) -> Result<(), HandlerError> {
        let field = NodeRef::new(NodeLabel::CustomField, data.custom_field_id.as_str());
        let created_at = at_or_now(data.created_at, &self.ctx);
        let value = &data.custom_field_value;

        let on_create = Properties::new()
            .with("createdAt", created_at)
            .with("source", data.source.as_str())
            .with("sourceOfTruth", data.source.as_str())
            .with("appSource", self.ctx.app_source.as_str())
            .with("templateId", data.template_id.as_deref());
        let props = Properties::new()
            .with("name", data.custom_field_name.as_str())
            .with("dataType", data.custom_field_data_type.as_str())
            .with("textValue", value.str.as_deref())
            .with("intValue", value.int)
            .with("decimalValue", value.decimal)
            .with("boolValue", value.bool)
            .with("timeValue", value.time)
            .with("updatedAt", data.updated_at.unwrap_or(created_at));

        self.ctx.graph.merge_node(&event.tenant, &field, on_create, props).await?;
        self.ctx
            .link(
                &event.tenant,
                &Self::node(event),
                RelationshipType::HasProperty,
                &field,
                Properties::new(),
            )
            .await?;
        self.updated(event).await;
        Ok(())
    }

    async fn on_add_parent(
        &self,
        event: &DecodedEvent,
        data: &OrganizationAddParentEvent,
    ) -> Result<(), HandlerError> {
        let parent = NodeRef::new(NodeLabel::Organization, data.parent_organization_id.as_str());
        self.ctx
            .link(
                &event.tenant,
                &Self::node(event),
                RelationshipType::SubsidiaryOf,
                &parent,
                Properties::new().with("type", data.relation_type.as_str()),
            )
            .await?;
        self.updated(event).await;
        Ok(())
    }

    async fn on_remove_parent(
        &self,
        event: &DecodedEvent,
        data: &OrganizationRemoveParentEvent,
    ) -> Result<(), HandlerError> {
        let parent = NodeRef::new(NodeLabel::Organization, data.parent_organization_id.as_str());
        self.ctx
            .graph
            .delete_relationship(
                &event.tenant,
                &Self::node(event),
                RelationshipType::SubsidiaryOf,
                &parent,
            )
            .await?;
        self.updated(event).await;
        Ok(())
    }

    async fn on_update_onboarding_status(
        &self,
        event: &DecodedEvent,
        data: &OrganizationUpdateOnboardingStatusEvent,
    ) -> Result<(), HandlerError> {
        let node = Self::node(event);
        let Some(current) = self.ctx.graph.get_node(&event.tenant, &node).await? else {
            tracing::warn!(
                tenant = %event.tenant,
                organization_id = %event.object_id,
                "Organization not projected yet"
            );
            return Ok(());
        };
        let previous = Organization::from_node(&current).onboarding_status;

        let updated_at = at_or_now(data.updated_at, &self.ctx);
        let props = Properties::new()
            .with("onboardingStatus", data.status.as_str())
            .with("onboardingComments", data.comments.as_str())
            .with("onboardingUpdatedAt", updated_at)
            .with("updatedAt", updated_at);
        self.ctx.graph.update_node(&event.tenant, &node, props).await?;

        if previous != data.status {
            let content = if data.caused_by_contract_id.is_empty() {
                format!("The onboarding status was changed to {}", humanize(&data.status))
            } else {
                format!("The onboarding status was automatically set to {}", humanize(&data.status))
            };
            let metadata = json!({
                "status": data.status,
                "comments": data.comments,
                "userId": data.updated_by_user_id,
                "contractId": data.caused_by_contract_id,
            });
            self.ctx
                .create_action(
                    &event.tenant,
                    &node,
                    ACTION_ONBOARDING_STATUS_CHANGED,
                    &content,
                    &metadata,
                )
                .await?;
        }
        self.updated(event).await;
        Ok(())
    }

    async fn on_create_billing_profile(
        &self,
        event: &DecodedEvent,
        data: &BillingProfileCreateEvent,
    ) -> Result<(), HandlerError> {
        let profile = NodeRef::new(NodeLabel::BillingProfile, data.billing_profile_id.as_str());
        let created_at = at_or_now(data.created_at, &self.ctx);
        let mut on_create = self.ctx.source_properties(&data.source);
        on_create.set("createdAt", created_at);

        self.ctx
            .graph
            .merge_node(
                &event.tenant,
                &profile,
                on_create,
                Properties::new()
                    .with("legalName", data.legal_name.as_str())
                    .with("taxId", data.tax_id.as_str())
                    .with("updatedAt", data.updated_at.unwrap_or(created_at)),
            )
            .await?;
        self.ctx
            .link(
                &event.tenant,
                &Self::node(event),
                RelationshipType::HasBillingProfile,
                &profile,
                Properties::new(),
            )
            .await?;
        self.updated(event).await;
        Ok(())
    }

    async fn on_update_billing_profile(
        &self,
        event: &DecodedEvent,
        data: &BillingProfileUpdateEvent,
    ) -> Result<(), HandlerError> {
        let profile = NodeRef::new(NodeLabel::BillingProfile, data.billing_profile_id.as_str());
        let props = Properties::new()
            .with_if(
                mask_allows(&data.fields_mask, "legalName"),
                "legalName",
                data.legal_name.as_str(),
            )
            .with_if(mask_allows(&data.fields_mask, "taxId"), "taxId", data.tax_id.as_str())
            .with("updatedAt", at_or_now(data.updated_at, &self.ctx));
        self.ctx.graph.update_node(&event.tenant, &profile, props).await?;
        self.updated(event).await;
        Ok(())
    }

    async fn on_link_billing_profile(
        &self,
        event: &DecodedEvent,
        profile_id: &str,
        target: NodeRef,
        properties: Properties,
    ) -> Result<(), HandlerError> {
        let profile = NodeRef::new(NodeLabel::BillingProfile, profile_id);
        self.ctx
            .link(&event.tenant, &profile, RelationshipType::Has, &target, properties)
            .await?;
        self.updated(event).await;
        Ok(())
    }

    async fn on_unlink_billing_profile(
        &self,
        event: &DecodedEvent,
        profile_id: &str,
        target: NodeRef,
    ) -> Result<(), HandlerError> {
        let profile = NodeRef::new(NodeLabel::BillingProfile, profile_id);
        self.ctx
            .graph
            .delete_relationship(&event.tenant, &profile, RelationshipType::Has, &target)
            .await?;
        self.updated(event).await;
        Ok(())
    }

    async fn on_email_link_to_billing_profile(
        &self,
        event: &DecodedEvent,
        data: &BillingProfileEmailEvent,
    ) -> Result<(), HandlerError> {
        let email = NodeRef::new(NodeLabel::Email, data.email_id.as_str());
        self.on_link_billing_profile(
            event,
            &data.billing_profile_id,
            email,
            Properties::new().with("primary", data.primary),
        )
        .await
    }

    async fn on_location_link_to_billing_profile(
        &self,
        event: &DecodedEvent,
        data: &BillingProfileLocationEvent,
    ) -> Result<(), HandlerError> {
        let location = NodeRef::new(NodeLabel::Location, data.location_id.as_str());
        self.on_link_billing_profile(event, &data.billing_profile_id, location, Properties::new())
            .await
    }

    async fn on_add_location(
        &self,
        event: &DecodedEvent,
        data: &OrganizationAddLocationEvent,
    ) -> Result<(), HandlerError> {
        let location = NodeRef::new(NodeLabel::Location, data.location_id.as_str());
        let created_at = at_or_now(data.created_at, &self.ctx);
        let mut on_create = self.ctx.source_properties(&data.source);
        on_create.set("createdAt", created_at);
        let mut props = address_properties(&data.location_address);
        props.set("name", data.name.as_str());
        props.set("rawAddress", data.raw_address.as_str());
        props.set("updatedAt", created_at);

        self.ctx.graph.merge_node(&event.tenant, &location, on_create, props).await?;
        self.ctx
            .link(
                &event.tenant,
                &Self::node(event),
                RelationshipType::AssociatedWith,
                &location,
                Properties::new(),
            )
            .await?;
        self.updated(event).await;
        Ok(())
    }
}

/// Rank of a renewal likelihood; lower is worse.
fn likelihood_order(likelihood: &str) -> i64 {
    match likelihood {
        "HIGH" => 40,
        "MEDIUM" => 30,
        "LOW" => 20,
        "ZERO" => 10,
        _ => 0,
    }
}

/// `NOT_STARTED` as `Not started`.
fn humanize(status: &str) -> String {
    let lower = status.replace('_', " ").to_lowercase();
    let mut chars = lower.chars();
    chars
        .next()
        .map(|first| first.to_uppercase().chain(chars).collect())
        .unwrap_or_default()
}

#[async_trait]
impl Handler for OrganizationEventHandler {
    fn name(&self) -> &'static str {
        "OrganizationEventHandler"
    }

    async fn handle(&self, event: &DecodedEvent) -> Result<(), HandlerError> {
        match &event.payload {
            EventPayload::OrganizationCreate(data) => self.on_create(event, data).await,
            EventPayload::OrganizationUpdate(data) => self.on_update(event, data).await,
            EventPayload::OrganizationPhoneNumberLink(data) => {
                self.on_phone_number_link(event, data).await
            }
            EventPayload::OrganizationLocationLink(data) => {
                self.on_location_link(event, data).await
            }
            EventPayload::OrganizationUnlinkDomain(data) => {
                self.on_unlink_domain(event, data).await
            }
            EventPayload::OrganizationRemoveSocial(data) => {
                self.on_remove_social(event, data).await
            }
            EventPayload::OrganizationShow(data) => self.on_show(event, data).await,
            EventPayload::OrganizationRefreshArr(_) => self.on_refresh_arr(event).await,
            EventPayload::OrganizationRefreshRenewalSummary(_) => {
                self.on_refresh_renewal_summary(event).await
            }
            EventPayload::OrganizationRefreshDerivedData(_) => {
                self.on_refresh_derived_data(event).await
            }
            EventPayload::OrganizationUpsertCustomField(data) => {
                self.on_upsert_custom_field(event, data).await
            }
            EventPayload::OrganizationAddParent(data) => self.on_add_parent(event, data).await,
            EventPayload::OrganizationRemoveParent(data) => {
                self.on_remove_parent(event, data).await
            }
            EventPayload::OrganizationUpdateOnboardingStatus(data) => {
                self.on_update_onboarding_status(event, data).await
            }
            EventPayload::OrganizationCreateBillingProfile(data) => {
                self.on_create_billing_profile(event, data).await
            }
            EventPayload::OrganizationUpdateBillingProfile(data) => {
                self.on_update_billing_profile(event, data).await
            }
            EventPayload::OrganizationEmailLinkToBillingProfile(data) => {
                self.on_email_link_to_billing_profile(event, data).await
            }
            EventPayload::OrganizationEmailUnlinkFromBillingProfile(data) => {
                let email = NodeRef::new(NodeLabel::Email, data.email_id.as_str());
                self.on_unlink_billing_profile(event, &data.billing_profile_id, email).await
            }
            EventPayload::OrganizationLocationLinkToBillingProfile(data) => {
                self.on_location_link_to_billing_profile(event, data).await
            }
            EventPayload::OrganizationLocationUnlinkFromBillingProfile(data) => {
                let location = NodeRef::new(NodeLabel::Location, data.location_id.as_str());
                self.on_unlink_billing_profile(event, &data.billing_profile_id, location).await
            }
            EventPayload::OrganizationAddLocation(data) => self.on_add_location(event, data).await,
            other => Err(HandlerError::unexpected(self.name(), other)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::graph::test_support::{Harness, decoded, harness};
    use chrono::Duration;
    use crm_projections_core::event_kind::EventKind;
    use crm_projections_core::notifier::CompletionKind;
    use crm_projections_testing::{builders, test_clock};
    use crm_projections_core::environment::Clock;

    fn org() -> NodeRef {
        NodeRef::new(NodeLabel::Organization, "o1")
    }

    fn seed_contract_with_renewal(h: &Harness, contract_id: &str, renewal: Properties) {
        let contract = NodeRef::new(NodeLabel::Contract, contract_id);
        let opportunity = NodeRef::new(NodeLabel::Opportunity, format!("{contract_id}-renewal"));
        h.graph.seed("acme", &contract, Properties::new().with("status", "LIVE"));
        h.graph.seed(
            "acme",
            &opportunity,
            renewal.with("internalType", "RENEWAL").with("internalStage", "OPEN"),
        );
        h.graph.seed_edge(
            "acme",
            &org(),
            RelationshipType::HasContract,
            &contract,
            Properties::new(),
        );
        h.graph
            .seed_edge(
                "acme",
                &contract,
                RelationshipType::ActiveRenewal,
                &opportunity,
                Properties::new(),
            );
    }

    #[tokio::test]
    async fn create_writes_fields_and_external_link() {
        let h = harness();
        let handler = OrganizationEventHandler::new(h.ctx.clone());
        let create = builders::event(
            EventKind::OrganizationCreate,
            "acme",
            "o1",
            json!({
                "name": "Acme Corp",
                "website": "acme.com",
                "employees": 120,
                "source": {"source": "hubspot"},
                "externalSystem": {"externalSystemId": "hubspot", "externalId": "42"}
            }),
        );
        handler.handle(&decoded(&create)).await.unwrap();

        let props = h.graph.node("acme", &org()).unwrap();
        assert_eq!(props.string("name"), "Acme Corp");
        assert_eq!(props.get_i64("employees"), Some(120));
        assert_eq!(props.string("source"), "hubspot");
        let system = NodeRef::new(NodeLabel::ExternalSystem, "hubspot");
        let link = h.graph.edge("acme", &org(), RelationshipType::IsLinkedWith, &system).unwrap();
        assert_eq!(link.string("externalId"), "42");
        assert_eq!(h.notifier.notified()[0].kind, CompletionKind::Create);
    }

    #[tokio::test]
    async fn replayed_create_keeps_one_node_and_one_link() {
        let h = harness();
        let handler = OrganizationEventHandler::new(h.ctx.clone());
        let payload = |created_at: &str| {
            json!({
                "name": "Acme Corp",
                "createdAt": created_at,
                "externalSystem": {"externalSystemId": "hubspot", "externalId": "42"}
            })
        };
        let create = builders::event(
            EventKind::OrganizationCreate,
            "acme",
            "o1",
            payload("2024-03-01T10:00:00Z"),
        );

        handler.handle(&decoded(&create)).await.unwrap();
        let created_at = h.graph.node("acme", &org()).unwrap().get_datetime("createdAt");
        assert!(created_at.is_some());

        handler.handle(&decoded(&create)).await.unwrap();
        let redelivered = builders::event(
            EventKind::OrganizationCreate,
            "acme",
            "o1",
            payload("2024-05-01T10:00:00Z"),
        );
        handler.handle(&decoded(&redelivered)).await.unwrap();

        assert_eq!(h.graph.count(NodeLabel::Organization), 1);
        assert_eq!(h.graph.count(NodeLabel::ExternalSystem), 1);
        let links = h
            .ctx
            .graph
            .related(
                "acme",
                &org(),
                RelationshipType::IsLinkedWith,
                Direction::Outgoing,
                NodeLabel::ExternalSystem,
            )
            .await
            .unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(h.graph.node("acme", &org()).unwrap().get_datetime("createdAt"), created_at);
    }

    #[tokio::test]
    async fn update_honours_the_field_mask() {
        let h = harness();
        let handler = OrganizationEventHandler::new(h.ctx.clone());
        h.graph.seed(
            "acme",
            &org(),
            Properties::new().with("name", "Acme").with("website", "acme.com"),
        );

        let update = builders::event(
            EventKind::OrganizationUpdate,
            "acme",
            "o1",
            json!({"name": "Acme Corp", "website": "", "fieldsMask": ["name"]}),
        );
        handler.handle(&decoded(&update)).await.unwrap();

        let props = h.graph.node("acme", &org()).unwrap();
        assert_eq!(props.string("name"), "Acme Corp");
        assert_eq!(props.string("website"), "acme.com");
    }

    #[tokio::test]
    async fn refresh_arr_sums_open_renewals_of_running_contracts() {
        let h = harness();
        let handler = OrganizationEventHandler::new(h.ctx.clone());
        h.graph.seed("acme", &org(), Properties::new());
        seed_contract_with_renewal(
            &h,
            "k1",
            Properties::new().with("amount", 100.0).with("maxAmount", 120.0),
        );
        seed_contract_with_renewal(
            &h,
            "k2",
            Properties::new().with("amount", 50.0).with("maxAmount", 50.0),
        );
        let ended = NodeRef::new(NodeLabel::Contract, "k2");
        h.graph.seed(
            "acme",
            &ended,
            Properties::new().with("endedAt", test_clock().now() - Duration::days(1)),
        );

        let refresh = builders::event(EventKind::OrganizationRefreshArr, "acme", "o1", json!({}));
        handler.handle(&decoded(&refresh)).await.unwrap();

        let props = h.graph.node("acme", &org()).unwrap();
        assert_eq!(props.get_f64("renewalForecastArr"), Some(100.0));
        assert_eq!(props.get_f64("renewalForecastMaxArr"), Some(120.0));
    }

    #[tokio::test]
    async fn renewal_summary_takes_next_date_and_lowest_likelihood() {
        let h = harness();
        let handler = OrganizationEventHandler::new(h.ctx.clone());
        let now = test_clock().now();
        h.graph.seed("acme", &org(), Properties::new());
        seed_contract_with_renewal(
            &h,
            "k1",
            Properties::new()
                .with("renewedAt", now + Duration::days(90))
                .with("renewalLikelihood", "HIGH"),
        );
        seed_contract_with_renewal(
            &h,
            "k2",
            Properties::new()
                .with("renewedAt", now + Duration::days(30))
                .with("renewalLikelihood", "LOW"),
        );

        let refresh = builders::event(
            EventKind::OrganizationRefreshRenewalSummary,
            "acme",
            "o1",
            json!({}),
        );
        handler.handle(&decoded(&refresh)).await.unwrap();

        let props = h.graph.node("acme", &org()).unwrap();
        assert_eq!(props.get_datetime("derivedNextRenewalAt"), Some(now + Duration::days(30)));
        assert_eq!(props.string("derivedRenewalLikelihood"), "LOW");
    }

    #[tokio::test]
    async fn derived_data_sums_contract_ltv() {
        let h = harness();
        let handler = OrganizationEventHandler::new(h.ctx.clone());
        h.graph.seed("acme", &org(), Properties::new());
        let contracts = [("k1", 1000.5, false), ("k2", 250.25, false), ("k3", 999.0, true)];
        for (id, ltv, deleted) in contracts {
            let contract = NodeRef::new(NodeLabel::Contract, id);
            h.graph
                .seed(
                    "acme",
                    &contract,
                    Properties::new().with("ltv", ltv).with("deleted", deleted),
                );
            h.graph.seed_edge(
                "acme",
                &org(),
                RelationshipType::HasContract,
                &contract,
                Properties::new(),
            );
        }

        let refresh = builders::event(
            EventKind::OrganizationRefreshDerivedData,
            "acme",
            "o1",
            json!({}),
        );
        handler.handle(&decoded(&refresh)).await.unwrap();

        let props = h.graph.node("acme", &org()).unwrap();
        assert_eq!(props.get_f64("derivedLtv"), Some(1250.75));
    }

    #[tokio::test]
    async fn onboarding_change_records_one_action() {
        let h = harness();
        let handler = OrganizationEventHandler::new(h.ctx.clone());
        h.graph.seed("acme", &org(), Properties::new());

        let change = builders::event(
            EventKind::OrganizationUpdateOnboardingStatus,
            "acme",
            "o1",
            json!({"status": "NOT_STARTED", "causedByContractId": "k1"}),
        );
        handler.handle(&decoded(&change)).await.unwrap();
        handler.handle(&decoded(&change)).await.unwrap();

        assert_eq!(h.graph.count(NodeLabel::Action), 1);
        let actions = h
            .ctx
            .graph
            .related(
                "acme",
                &org(),
                RelationshipType::ActionOn,
                Direction::Incoming,
                NodeLabel::Action,
            )
            .await
            .unwrap();
        assert_eq!(
            actions[0].node.properties.string("content"),
            "The onboarding status was automatically set to Not started"
        );
        assert_eq!(h.graph.node("acme", &org()).unwrap().string("onboardingStatus"), "NOT_STARTED");
    }

    #[tokio::test]
    async fn parent_link_is_removed_again() {
        let h = harness();
        let handler = OrganizationEventHandler::new(h.ctx.clone());
        let parent = NodeRef::new(NodeLabel::Organization, "p1");
        h.graph.seed("acme", &org(), Properties::new());
        h.graph.seed("acme", &parent, Properties::new());

        let add = builders::event(
            EventKind::OrganizationAddParent,
            "acme",
            "o1",
            json!({"parentOrganizationId": "p1", "type": "store"}),
        );
        handler.handle(&decoded(&add)).await.unwrap();
        let edge = h.graph.edge("acme", &org(), RelationshipType::SubsidiaryOf, &parent).unwrap();
        assert_eq!(edge.string("type"), "store");

        let remove = builders::event(
            EventKind::OrganizationRemoveParent,
            "acme",
            "o1",
            json!({"parentOrganizationId": "p1"}),
        );
        handler.handle(&decoded(&remove)).await.unwrap();
        assert!(!h.graph.has_edge("acme", &org(), RelationshipType::SubsidiaryOf, &parent));
    }

    #[tokio::test]
    async fn custom_field_is_attached() {
        let h = harness();
        let handler = OrganizationEventHandler::new(h.ctx.clone());
        h.graph.seed("acme", &org(), Properties::new());

        let upsert = builders::event(
            EventKind::OrganizationUpsertCustomField,
            "acme",
            "o1",
            json!({
                "customFieldId": "f1",
                "customFieldName": "Tier",
                "customFieldDataType": "TEXT",
                "customFieldValue": {"str": "gold"}
            }),
        );
        handler.handle(&decoded(&upsert)).await.unwrap();

        let field = NodeRef::new(NodeLabel::CustomField, "f1");
        assert_eq!(h.graph.node("acme", &field).unwrap().string("textValue"), "gold");
        assert!(h.graph.has_edge("acme", &org(), RelationshipType::HasProperty, &field));
    }

    #[tokio::test]
    async fn billing_profile_links_email_and_location() {
        let h = harness();
        let handler = OrganizationEventHandler::new(h.ctx.clone());
        let email = NodeRef::new(NodeLabel::Email, "e1");
        let profile = NodeRef::new(NodeLabel::BillingProfile, "b1");
        h.graph.seed("acme", &org(), Properties::new());
        h.graph.seed("acme", &email, Properties::new());

        let create = builders::event(
            EventKind::OrganizationCreateBillingProfile,
            "acme",
            "o1",
            json!({"billingProfileId": "b1", "legalName": "Acme Corp Ltd"}),
        );
        handler.handle(&decoded(&create)).await.unwrap();
        assert!(h.graph.has_edge("acme", &org(), RelationshipType::HasBillingProfile, &profile));

        let link = builders::event(
            EventKind::OrganizationEmailLinkToBillingProfile,
            "acme",
            "o1",
            json!({"billingProfileId": "b1", "emailId": "e1", "primary": true}),
        );
        handler.handle(&decoded(&link)).await.unwrap();
        assert!(h.graph.has_edge("acme", &profile, RelationshipType::Has, &email));

        let unlink = builders::event(
            EventKind::OrganizationEmailUnlinkFromBillingProfile,
            "acme",
            "o1",
            json!({"billingProfileId": "b1", "emailId": "e1"}),
        );
        handler.handle(&decoded(&unlink)).await.unwrap();
        assert!(!h.graph.has_edge("acme", &profile, RelationshipType::Has, &email));
    }

    #[test]
    fn statuses_read_as_sentences() {
        assert_eq!(humanize("NOT_STARTED"), "Not started");
        assert_eq!(humanize("DONE"), "Done");
        assert_eq!(humanize(""), "");
    }
}

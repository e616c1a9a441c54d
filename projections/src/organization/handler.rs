//! Enrichment and market normalisation handler.

use super::client::{EnrichedLocation, EnrichedOrganization, EnrichedSocial, EnrichmentApi};
use super::{map_market, name_from_domain, primary_domain};
use crate::graph::GraphContext;
use async_trait::async_trait;
use crm_projections_core::command::Command;
use crm_projections_core::events::{
    EventPayload, LocationAddress, OrganizationCreateEvent, OrganizationRequestEnrichEvent,
    OrganizationUpdateEvent, mask_allows,
};
use crm_projections_core::graph::{Direction, NodeLabel, NodeRef, Properties, RelationshipType};
use crm_projections_core::handler::{DecodedEvent, Handler, HandlerError};
use crm_projections_core::model::{Domain, Organization};
use crm_projections_core::notifier::EventCompleted;
use crm_projections_runtime::await_condition;
use std::sync::Arc;

/// Oldest plausible founding year; anything earlier is treated as unset.
const MIN_YEAR_FOUNDED: i64 = 1000;

/// Handles the organization subscriber's event kinds.
#[derive(Clone)]
pub struct OrganizationEnrichmentHandler {
    ctx: GraphContext,
    api: Arc<dyn EnrichmentApi>,
}

impl OrganizationEnrichmentHandler {
    /// Create the handler.
    #[must_use]
    pub fn new(ctx: GraphContext, api: Arc<dyn EnrichmentApi>) -> Self {
        Self { ctx, api }
    }

    async fn on_request_enrich(
        &self,
        event: &DecodedEvent,
        data: &OrganizationRequestEnrichEvent,
    ) -> Result<(), HandlerError> {
        let domain = primary_domain(&data.website);
        if domain.is_empty() {
            tracing::debug!(tenant = %event.tenant, website = %data.website, "No domain to enrich");
            return Ok(());
        }
        self.enrich(&event.tenant, &event.object_id, &domain).await;
        Ok(())
    }

    /// Enrichment never fails the delivery; every failure is recorded on the
    /// organization or logged.
    async fn enrich(&self, tenant: &str, organization_id: &str, domain: &str) {
        match self.ctx.graph.get_node(tenant, &NodeRef::new(NodeLabel::Domain, domain)).await {
            Ok(Some(node)) if Domain::from_node(&node).primary == Some(true) => {}
            Ok(_) => {
                tracing::info!(tenant, domain, "Domain is not primary, enrichment skipped");
                return;
            }
            Err(e) => {
                tracing::error!(tenant, domain, error = %e, "Failed to read domain");
                return;
            }
        }

        let node = NodeRef::new(NodeLabel::Organization, organization_id);
        let organization = match self.ctx.graph.get_node(tenant, &node).await {
            Ok(Some(found)) => Organization::from_node(&found),
            Ok(None) => {
                tracing::warn!(
                    tenant,
                    organization_id,
                    "Organization not projected, enrichment skipped"
                );
                return;
            }
            Err(e) => {
                tracing::error!(tenant, organization_id, error = %e, "Failed to read organization");
                return;
            }
        };
        if organization.enriched_at.is_some() {
            tracing::info!(tenant, organization_id, "Organization already enriched");
            return;
        }

        self.mark(tenant, &node, "enrichRequestedAt").await;
        self.ctx
            .notify(EventCompleted::update(tenant, NodeLabel::Organization, organization_id))
            .await;

        match self.api.enrich_organization(tenant, domain).await {
            Ok(response) if response.success => {
                self.apply(
                    tenant,
                    domain,
                    &response.primary_enrich_source,
                    &organization,
                    &response.data,
                )
                .await;
            }
            Ok(_) => {
                tracing::info!(tenant, organization_id, domain, "Enrichment found nothing");
                self.mark(tenant, &node, "enrichFailedAt").await;
            }
            Err(e) => {
                tracing::error!(
                    tenant,
                    organization_id,
                    domain,
                    error = %e,
                    "Enrichment API call failed"
                );
                self.mark(tenant, &node, "enrichFailedAt").await;
            }
        }
    }

    async fn mark(&self, tenant: &str, node: &NodeRef, property: &str) {
        let props = Properties::new().with(property, self.ctx.now());
        if let Err(e) = self.ctx.graph.update_node(tenant, node, props).await {
            tracing::error!(
                tenant,
                organization_id = %node.id,
                property,
                error = %e,
                "Failed to update organization"
            );
        }
    }

    /// Fill blank organization fields from `data`; existing values win.
    async fn apply(
        &self,
        tenant: &str,
        domain: &str,
        source: &str,
        organization: &Organization,
        data: &EnrichedOrganization,
    ) {
        let node = NodeRef::new(NodeLabel::Organization, organization.id.as_str());
        let now = self.ctx.now();
        let enriched_domain = if data.domain.is_empty() { domain } else { data.domain.as_str() };

        let mut props = Properties::new()
            .with("enrichDomain", domain)
            .with("enrichSource", source)
            .with("enrichedAt", now)
            .with("updatedAt", now)
            .with_if(organization.employees == 0 && data.employees > 0, "employees", data.employees)
            .with_if(
                organization.year_founded.is_none_or(|year| year < MIN_YEAR_FOUNDED)
                    && data.founded_year > 0,
                "yearFounded",
                data.founded_year,
            )
            .with_if(
                organization.value_proposition.is_empty() && !data.short_description.is_empty(),
                "valueProposition",
                data.short_description.as_str(),
            )
            .with_if(
                organization.description.is_empty() && !data.long_description.is_empty(),
                "description",
                data.long_description.as_str(),
            )
            .with_if(
                organization.industry.is_empty() && !data.industry.is_empty(),
                "industry",
                data.industry.as_str(),
            );

        if let (None, Some(public)) = (organization.is_public, data.public) {
            props.set("isPublic", public);
        }
        if organization.name.is_empty() {
            let name = if data.name.is_empty() {
                name_from_domain(enriched_domain)
            } else {
                data.name.clone()
            };
            props.set("name", name);
        }
        if organization.website.is_empty() {
            let website = if data.website.is_empty() {
                enriched_domain
            } else {
                data.website.as_str()
            };
            props.set("website", website);
        }
        if let (true, Some(logo)) = (organization.logo_url.is_empty(), data.logos.first()) {
            props.set("logoUrl", logo.as_str());
        }
        if let (true, Some(icon)) = (organization.icon_url.is_empty(), data.icons.first()) {
            props.set("iconUrl", icon.as_str());
        }

        match self.ctx.graph.update_node(tenant, &node, props).await {
            Ok(_) => {
                self.ctx
                    .notify(EventCompleted::update(
                        tenant,
                        NodeLabel::Organization,
                        &organization.id,
                    ))
                    .await;
            }
            Err(e) => {
                tracing::error!(
                    tenant,
                    organization_id = %organization.id,
                    error = %e,
                    "Failed to save enrichment"
                );
            }
        }

        if !data.location.is_empty() {
            self.add_location(tenant, &organization.id, &data.location).await;
        }
        for social in &data.socials {
            if let Err(e) = self.add_social(tenant, &node, social).await {
                tracing::error!(
                    tenant,
                    organization_id = %organization.id,
                    url = %social.url,
                    error = %e,
                    "Failed to add social"
                );
            }
        }
    }

    async fn add_location(&self, tenant: &str, organization_id: &str, location: &EnrichedLocation) {
        let address = LocationAddress {
            country: location.country.clone(),
            country_code_a2: location.country_code_a2.clone(),
            country_code_a3: location.country_code_a3.clone(),
            region: location.region.clone(),
            locality: location.locality.clone(),
            address1: location.address_line1.clone(),
            address2: location.address_line2.clone(),
            postal_code: location.postal_code.clone(),
            zip: location.postal_code.clone(),
            ..LocationAddress::default()
        };
        self.ctx
            .send_best_effort(Command::AddOrganizationLocation {
                tenant: tenant.to_string(),
                organization_id: organization_id.to_string(),
                raw_address: location.raw_address(),
                address,
                app_source: self.ctx.app_source.clone(),
            })
            .await;
    }

    /// Link a social profile unless the organization already has its url.
    async fn add_social(
        &self,
        tenant: &str,
        organization: &NodeRef,
        social: &EnrichedSocial,
    ) -> Result<(), HandlerError> {
        if social.url.is_empty() {
            return Ok(());
        }
        let existing = self
            .ctx
            .graph
            .related(
                tenant,
                organization,
                RelationshipType::Has,
                Direction::Outgoing,
                NodeLabel::Social,
            )
            .await?;
        if existing.iter().any(|s| s.node.properties.string("url") == social.url) {
            return Ok(());
        }

        let node = NodeRef::new(NodeLabel::Social, uuid::Uuid::new_v4().to_string());
        let now = self.ctx.now();
        let on_create = Properties::new()
            .with("createdAt", now)
            .with("source", "openline")
            .with("sourceOfTruth", "openline")
            .with("appSource", self.ctx.app_source.as_str());
        let props = Properties::new()
            .with("url", social.url.as_str())
            .with("alias", social.alias.as_str())
            .with("externalId", social.id.as_str())
            .with("updatedAt", now);
        self.ctx.graph.merge_node(tenant, &node, on_create, props).await?;
        self.ctx
            .link(tenant, organization, RelationshipType::Has, &node, Properties::new())
            .await?;
        Ok(())
    }

    /// Normalise the market of a new organization through the command side.
    async fn on_create(
        &self,
        event: &DecodedEvent,
        data: &OrganizationCreateEvent,
    ) -> Result<(), HandlerError> {
        self.normalise_market(event, &data.market).await
    }

    /// Same normalisation for updates that write the market.
    async fn on_update(
        &self,
        event: &DecodedEvent,
        data: &OrganizationUpdateEvent,
    ) -> Result<(), HandlerError> {
        if !mask_allows(&data.fields_mask, "market") {
            tracing::debug!(
                tenant = %event.tenant,
                organization_id = %event.object_id,
                "Market not part of the update"
            );
            return Ok(());
        }
        self.normalise_market(event, &data.market).await
    }

    async fn normalise_market(
        &self,
        event: &DecodedEvent,
        given: &str,
    ) -> Result<(), HandlerError> {
        let market = map_market(given);
        if market.is_empty() || market == given {
            tracing::debug!(
                tenant = %event.tenant,
                organization_id = %event.object_id,
                "No need to update organization"
            );
            return Ok(());
        }

        let graph = &self.ctx.graph;
        let tenant = event.tenant.as_str();
        let node = &NodeRef::new(NodeLabel::Organization, event.object_id.as_str());
        let visible = await_condition(&self.ctx.visibility, || async move {
            graph.get_node(tenant, node).await.map(|found| found.is_some())
        })
        .await;
        if let Err(e) = visible {
            tracing::warn!(
                tenant,
                organization_id = %node.id,
                error = %e,
                "Organization not visible yet, updating anyway"
            );
        }

        self.ctx
            .send(Command::UpdateOrganization {
                tenant: event.tenant.clone(),
                organization_id: event.object_id.clone(),
                market,
                industry: String::new(),
                fields_mask: vec!["market".to_string()],
                app_source: self.ctx.app_source.clone(),
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Handler for OrganizationEnrichmentHandler {
    fn name(&self) -> &'static str {
        "OrganizationEnrichmentHandler"
    }

    async fn handle(&self, event: &DecodedEvent) -> Result<(), HandlerError> {
        match &event.payload {
            EventPayload::OrganizationRequestEnrich(data) => {
                self.on_request_enrich(event, data).await
            }
            EventPayload::OrganizationCreate(data) => self.on_create(event, data).await,
            EventPayload::OrganizationUpdate(data) => self.on_update(event, data).await,
            other => Err(HandlerError::unexpected(self.name(), other)),
        }
    }
}

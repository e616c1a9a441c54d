//! Tenant billing profile and settings projections.
//!
//! Tenant events address the tenant by name, so the node touched is always
//! the tenant's own node and never the aggregate's object id.

use super::{GraphContext, at_or_now};
use async_trait::async_trait;
use crm_projections_core::events::{
    EventPayload, TenantBillingProfileCreateEvent, TenantBillingProfileUpdateEvent,
    TenantSettingsUpdateEvent, mask_allows,
};
use crm_projections_core::graph::{NodeLabel, NodeRef, Properties, PropertyValue, RelationshipType};
use crm_projections_core::handler::{DecodedEvent, Handler, HandlerError};

/// Billing profile fields shared by create and update, keyed by graph property.
macro_rules! billing_profile_fields {
    ($data:expr) => {
        [
            ("legalName", PropertyValue::from($data.legal_name.as_str())),
            ("phone", PropertyValue::from($data.phone.as_str())),
            ("addressLine1", PropertyValue::from($data.address_line1.as_str())),
            ("addressLine2", PropertyValue::from($data.address_line2.as_str())),
            ("addressLine3", PropertyValue::from($data.address_line3.as_str())),
            ("locality", PropertyValue::from($data.locality.as_str())),
            ("country", PropertyValue::from($data.country.as_str())),
            ("region", PropertyValue::from($data.region.as_str())),
            ("zip", PropertyValue::from($data.zip.as_str())),
            ("vatNumber", PropertyValue::from($data.vat_number.as_str())),
            ("sendInvoicesFrom", PropertyValue::from($data.send_invoices_from.as_str())),
            ("sendInvoicesBcc", PropertyValue::from($data.send_invoices_bcc.as_str())),
            ("canPayWithPigeon", PropertyValue::from($data.can_pay_with_pigeon)),
            ("canPayWithBankTransfer", PropertyValue::from($data.can_pay_with_bank_transfer)),
            ("check", PropertyValue::from($data.check)),
        ]
    };
}

/// Projects tenant billing profile and settings events.
#[derive(Debug, Clone)]
pub struct TenantEventHandler {
    ctx: GraphContext,
}

impl TenantEventHandler {
    /// Create the handler.
    #[must_use]
    pub const fn new(ctx: GraphContext) -> Self {
        Self { ctx }
    }

    async fn on_add_billing_profile(
        &self,
        event: &DecodedEvent,
        data: &TenantBillingProfileCreateEvent,
    ) -> Result<(), HandlerError> {
        let tenant = NodeRef::tenant(event.tenant.as_str());
        let profile = NodeRef::new(NodeLabel::TenantBillingProfile, data.id.as_str());
        let created_at = at_or_now(data.created_at, &self.ctx);
        let mut on_create = self.ctx.source_properties(&data.source);
        on_create.set("createdAt", created_at);

        let mut props = Properties::new().with("updatedAt", created_at);
        for (key, value) in billing_profile_fields!(data) {
            props.set(key, value);
        }
        self.ctx.graph.merge_node(&event.tenant, &profile, on_create, props).await?;
        self.ctx
            .link(
                &event.tenant,
                &tenant,
                RelationshipType::HasBillingProfile,
                &profile,
                Properties::new(),
            )
            .await?;
        Ok(())
    }

    async fn on_update_billing_profile(
        &self,
        event: &DecodedEvent,
        data: &TenantBillingProfileUpdateEvent,
    ) -> Result<(), HandlerError> {
        let profile = NodeRef::new(NodeLabel::TenantBillingProfile, data.id.as_str());
        let mut props = Properties::new().with("updatedAt", at_or_now(data.updated_at, &self.ctx));
        for (key, value) in billing_profile_fields!(data) {
            if mask_allows(&data.fields_mask, key) {
                props.set(key, value);
            }
        }
        if !self.ctx.graph.update_node(&event.tenant, &profile, props).await? {
            tracing::warn!(
                tenant = %event.tenant,
                billing_profile_id = %profile.id,
                "Tenant billing profile not found"
            );
        }
        Ok(())
    }

    async fn on_update_settings(
        &self,
        event: &DecodedEvent,
        data: &TenantSettingsUpdateEvent,
    ) -> Result<(), HandlerError> {
        let tenant = NodeRef::tenant(event.tenant.as_str());
        let settings = NodeRef::new(
            NodeLabel::TenantSettings,
            format!("{}-settings", event.tenant),
        );
        let mask = &data.fields_mask;
        let now = self.ctx.now();

        let props = Properties::new()
            .with_if(
                mask_allows(mask, "logoRepositoryFileId"),
                "logoRepositoryFileId",
                data.logo_repository_file_id.as_str(),
            )
            .with_if(mask_allows(mask, "baseCurrency"), "baseCurrency", data.base_currency.as_str())
            .with_if(
                mask_allows(mask, "invoicingEnabled"),
                "invoicingEnabled",
                data.invoicing_enabled,
            )
            .with_if(
                mask_allows(mask, "invoicingPostpaid"),
                "invoicingPostpaid",
                data.invoicing_postpaid,
            )
            .with("updatedAt", data.updated_at.unwrap_or(now));
        self.ctx
            .graph
            .merge_node(&event.tenant, &settings, Properties::new().with("createdAt", now), props)
            .await?;
        self.ctx
            .link(
                &event.tenant,
                &tenant,
                RelationshipType::HasSettings,
                &settings,
                Properties::new(),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Handler for TenantEventHandler {
    fn name(&self) -> &'static str {
        "TenantEventHandler"
    }

    async fn handle(&self, event: &DecodedEvent) -> Result<(), HandlerError> {
        match &event.payload {
            EventPayload::TenantAddBillingProfile(data) => {
                self.on_add_billing_profile(event, data).await
            }
            EventPayload::TenantUpdateBillingProfile(data) => {
                self.on_update_billing_profile(event, data).await
            }
            EventPayload::TenantUpdateSettings(data) => self.on_update_settings(event, data).await,
            other => Err(HandlerError::unexpected(self.name(), other)),
        }
    }
}

//! Tenant bank account projections.

use super::{GraphContext, at_or_now};
use async_trait::async_trait;
use crm_projections_core::events::{
    BankAccountCreateEvent, BankAccountDeleteEvent, BankAccountUpdateEvent, EventPayload,
    mask_allows,
};
use crm_projections_core::graph::{NodeLabel, NodeRef, Properties, PropertyValue, RelationshipType};
use crm_projections_core::handler::{DecodedEvent, Handler, HandlerError};

macro_rules! bank_account_fields {
    ($data:expr) => {
        [
            ("bankName", PropertyValue::from($data.bank_name.as_str())),
            ("bankTransferEnabled", PropertyValue::from($data.bank_transfer_enabled)),
            ("allowInternational", PropertyValue::from($data.allow_international)),
            ("currency", PropertyValue::from($data.currency.as_str())),
            ("iban", PropertyValue::from($data.iban.as_str())),
            ("bic", PropertyValue::from($data.bic.as_str())),
            ("sortCode", PropertyValue::from($data.sort_code.as_str())),
            ("accountNumber", PropertyValue::from($data.account_number.as_str())),
            ("routingNumber", PropertyValue::from($data.routing_number.as_str())),
            ("otherDetails", PropertyValue::from($data.other_details.as_str())),
        ]
    };
}

/// Projects the tenant's bank account events.
#[derive(Debug, Clone)]
pub struct BankAccountEventHandler {
    ctx: GraphContext,
}

impl BankAccountEventHandler {
    /// Create the handler.
    #[must_use]
    pub const fn new(ctx: GraphContext) -> Self {
        Self { ctx }
    }

    async fn on_add(
        &self,
        event: &DecodedEvent,
        data: &BankAccountCreateEvent,
    ) -> Result<(), HandlerError> {
        let account = NodeRef::new(NodeLabel::BankAccount, data.id.as_str());
        let created_at = at_or_now(data.created_at, &self.ctx);
        let mut on_create = self.ctx.source_properties(&data.source);
        on_create.set("createdAt", created_at);

        let mut props = Properties::new().with("updatedAt", created_at);
        for (key, value) in bank_account_fields!(data) {
            props.set(key, value);
        }
        self.ctx.graph.merge_node(&event.tenant, &account, on_create, props).await?;
        self.ctx
            .link(
                &event.tenant,
                &NodeRef::tenant(event.tenant.as_str()),
                RelationshipType::HasBankAccount,
                &account,
                Properties::new(),
            )
            .await?;
        Ok(())
    }

    async fn on_update(
        &self,
        event: &DecodedEvent,
        data: &BankAccountUpdateEvent,
    ) -> Result<(), HandlerError> {
        let account = NodeRef::new(NodeLabel::BankAccount, data.id.as_str());
        let mut props = Properties::new().with("updatedAt", at_or_now(data.updated_at, &self.ctx));
        for (key, value) in bank_account_fields!(data) {
            if mask_allows(&data.fields_mask, key) {
                props.set(key, value);
            }
        }
        if !self.ctx.graph.update_node(&event.tenant, &account, props).await? {
            tracing::warn!(
                tenant = %event.tenant,
                bank_account_id = %account.id,
                "Bank account not found"
            );
        }
        Ok(())
    }

    async fn on_delete(
        &self,
        event: &DecodedEvent,
        data: &BankAccountDeleteEvent,
    ) -> Result<(), HandlerError> {
        let account = NodeRef::new(NodeLabel::BankAccount, data.id.as_str());
        self.ctx.graph.delete_node(&event.tenant, &account).await?;
        Ok(())
    }
}

#[async_trait]
impl Handler for BankAccountEventHandler {
    fn name(&self) -> &'static str {
        "BankAccountEventHandler"
    }

    async fn handle(&self, event: &DecodedEvent) -> Result<(), HandlerError> {
        match &event.payload {
            EventPayload::TenantAddBankAccount(data) => self.on_add(event, data).await,
            EventPayload::TenantUpdateBankAccount(data) => self.on_update(event, data).await,
            EventPayload::TenantDeleteBankAccount(data) => self.on_delete(event, data).await,
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
    async fn account_lifecycle() {
        let h = harness();
        let handler = BankAccountEventHandler::new(h.ctx.clone());
        let account = NodeRef::new(NodeLabel::BankAccount, "ba1");

        let add = builders::event(
            EventKind::TenantAddBankAccount,
            "acme",
            "acme",
            json!({"id": "ba1", "bankName": "First Bank", "iban": "DE00 1234", "currency": "EUR"}),
        );
        handler.handle(&decoded(&add)).await.unwrap();
        assert!(h.graph.has_edge(
            "acme",
            &NodeRef::tenant("acme"),
            RelationshipType::HasBankAccount,
            &account,
        ));

        let update = builders::event(
            EventKind::TenantUpdateBankAccount,
            "acme",
            "acme",
            json!({"id": "ba1", "bankName": "Second Bank", "iban": "", "fieldsMask": ["bankName"]}),
        );
        handler.handle(&decoded(&update)).await.unwrap();
        let props = h.graph.node("acme", &account).unwrap();
        assert_eq!(props.string("bankName"), "Second Bank");
        assert_eq!(props.string("iban"), "DE00 1234");

        let delete = builders::event(
            EventKind::TenantDeleteBankAccount,
            "acme",
            "acme",
            json!({"id": "ba1"}),
        );
        handler.handle(&decoded(&delete)).await.unwrap();
        assert!(h.graph.node("acme", &account).is_none());
    }
}

//! Invoice projections.

use super::{GraphContext, at_or_now};
use async_trait::async_trait;
use crm_projections_core::events::{
    EventPayload, InvoiceCreateForContractEvent, InvoiceFillEvent, InvoiceLineEvent,
    InvoicePdfGeneratedEvent,
};
use crm_projections_core::graph::{Direction, NodeLabel, NodeRef, Properties, RelationshipType};
use crm_projections_core::handler::{DecodedEvent, Handler, HandlerError};
use crm_projections_core::notifier::EventCompleted;

/// Status of an invoice that was created but not filled yet.
pub const STATUS_INITIALIZED: &str = "INITIALIZED";

/// Status of a voided invoice.
pub const STATUS_VOID: &str = "VOID";

/// Projects invoice events.
#[derive(Debug, Clone)]
pub struct InvoiceEventHandler {
    ctx: GraphContext,
}

impl InvoiceEventHandler {
    /// Create the handler.
    #[must_use]
    pub const fn new(ctx: GraphContext) -> Self {
        Self { ctx }
    }

    fn node(event: &DecodedEvent) -> NodeRef {
        NodeRef::new(NodeLabel::Invoice, event.object_id.as_str())
    }

    async fn on_create_for_contract(
        &self,
        event: &DecodedEvent,
        data: &InvoiceCreateForContractEvent,
    ) -> Result<(), HandlerError> {
        let invoice = Self::node(event);
        let created_at = at_or_now(data.created_at, &self.ctx);
        let mut on_create = self.ctx.source_properties(&data.source);
        on_create.set("createdAt", created_at);
        on_create.set("status", STATUS_INITIALIZED);

        let props = Properties::new()
            .with("contractId", data.contract_id.as_str())
            .with("currency", data.currency.as_str())
            .with("periodStartDate", data.period_start_date)
            .with("periodEndDate", data.period_end_date)
            .with("billingCycleInMonths", data.billing_cycle_in_months)
            .with("dryRun", data.dry_run)
            .with("preview", data.preview)
            .with("offCycle", data.off_cycle)
            .with("postpaid", data.postpaid)
            .with("note", data.note.as_str())
            .with("updatedAt", created_at);
        self.ctx.graph.merge_node(&event.tenant, &invoice, on_create, props).await?;

        let contract = NodeRef::new(NodeLabel::Contract, data.contract_id.as_str());
        self.ctx
            .link(
                &event.tenant,
                &contract,
                RelationshipType::HasInvoice,
                &invoice,
                Properties::new(),
            )
            .await?;

        self.ctx
            .notify(EventCompleted::create(&event.tenant, NodeLabel::Invoice, &event.object_id))
            .await;
        Ok(())
    }

    async fn on_fill(
        &self,
        event: &DecodedEvent,
        data: &InvoiceFillEvent,
    ) -> Result<(), HandlerError> {
        let invoice = Self::node(event);
        let updated_at = at_or_now(data.updated_at, &self.ctx);
        let props = Properties::new()
            .with("amount", data.amount)
            .with("vat", data.vat)
            .with("totalAmount", data.total_amount)
            .with("number", data.invoice_number.as_str())
            .with("status", data.status.as_str())
            .with("customerName", data.customer_name.as_str())
            .with("customerEmail", data.customer_email.as_str())
            .with("providerName", data.provider_name.as_str())
            .with("note", data.note.as_str())
            .with("updatedAt", updated_at);
        if !self.ctx.graph.update_node(&event.tenant, &invoice, props).await? {
            return Err(HandlerError::NotFound {
                entity: "Invoice",
                id: invoice.id,
            });
        }

        for line in &data.invoice_lines {
            self.merge_line(&event.tenant, &invoice, line, updated_at).await?;
        }

        self.ctx
            .notify(EventCompleted::update(&event.tenant, NodeLabel::Invoice, &event.object_id))
            .await;
        Ok(())
    }

    async fn merge_line(
        &self,
        tenant: &str,
        invoice: &NodeRef,
        line: &InvoiceLineEvent,
        updated_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), HandlerError> {
        let node = NodeRef::new(NodeLabel::InvoiceLine, line.id.as_str());
        let on_create = Properties::new()
            .with("createdAt", line.created_at.unwrap_or(updated_at))
            .with("appSource", self.ctx.app_source.as_str());
        let props = Properties::new()
            .with("name", line.name.as_str())
            .with("price", line.price)
            .with("quantity", line.quantity)
            .with("amount", line.amount)
            .with("vat", line.vat)
            .with("totalAmount", line.total_amount)
            .with("billedType", line.billed_type.as_str())
            .with("serviceLineItemId", line.service_line_item_id.as_str())
            .with("updatedAt", updated_at);
        self.ctx.graph.merge_node(tenant, &node, on_create, props).await?;
        self.ctx
            .link(tenant, invoice, RelationshipType::HasInvoiceLine, &node, Properties::new())
            .await?;

        if !line.service_line_item_id.is_empty() {
            let item = NodeRef::new(NodeLabel::ServiceLineItem, line.service_line_item_id.as_str());
            self.ctx
                .link(tenant, &node, RelationshipType::Invoiced, &item, Properties::new())
                .await?;
        }
        Ok(())
    }

    async fn on_pdf_generated(
        &self,
        event: &DecodedEvent,
        data: &InvoicePdfGeneratedEvent,
    ) -> Result<(), HandlerError> {
        let props = Properties::new()
            .with("repositoryFileId", data.repository_file_id.as_str())
            .with("updatedAt", at_or_now(data.updated_at, &self.ctx));
        self.ctx.graph.update_node(&event.tenant, &Self::node(event), props).await?;
        self.ctx
            .notify(EventCompleted::update(&event.tenant, NodeLabel::Invoice, &event.object_id))
            .await;
        Ok(())
    }

    async fn on_void(&self, event: &DecodedEvent) -> Result<(), HandlerError> {
        let props = Properties::new()
            .with("status", STATUS_VOID)
            .with("updatedAt", self.ctx.now());
        self.ctx.graph.update_node(&event.tenant, &Self::node(event), props).await?;
        self.ctx
            .notify(EventCompleted::update(&event.tenant, NodeLabel::Invoice, &event.object_id))
            .await;
        Ok(())
    }

    /// Remove the invoice together with its lines.
    async fn on_delete(&self, event: &DecodedEvent) -> Result<(), HandlerError> {
        let invoice = Self::node(event);
        let lines = self
            .ctx
            .graph
            .related(
                &event.tenant,
                &invoice,
                RelationshipType::HasInvoiceLine,
                Direction::Outgoing,
                NodeLabel::InvoiceLine,
            )
            .await?;
        for line in lines {
            self.ctx.graph.delete_node(&event.tenant, &line.node.node_ref()).await?;
        }
        self.ctx.graph.delete_node(&event.tenant, &invoice).await?;
        self.ctx
            .notify(EventCompleted::delete(&event.tenant, NodeLabel::Invoice, &event.object_id))
            .await;
        Ok(())
    }
}

#[async_trait]
impl Handler for InvoiceEventHandler {
    fn name(&self) -> &'static str {
        "InvoiceEventHandler"
    }

    async fn handle(&self, event: &DecodedEvent) -> Result<(), HandlerError> {
        match &event.payload {
            EventPayload::InvoiceCreateForContract(data) => {
                self.on_create_for_contract(event, data).await
            }
            EventPayload::InvoiceFill(data) => self.on_fill(event, data).await,
            EventPayload::InvoicePdfGenerated(data) => self.on_pdf_generated(event, data).await,
            EventPayload::InvoiceVoid(_) => self.on_void(event).await,
            EventPayload::InvoiceDelete(_) => self.on_delete(event).await,
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
    use crm_projections_core::model::Invoice;
    use crm_projections_testing::builders;
    use serde_json::json;

    #[tokio::test]
    async fn preview_invoice_is_created_under_its_contract() {
        let h = harness();
        let handler = InvoiceEventHandler::new(h.ctx.clone());
        let contract = NodeRef::new(NodeLabel::Contract, "k1");
        let invoice = NodeRef::new(NodeLabel::Invoice, "inv1");
        h.graph.seed("acme", &contract, Properties::new());

        let create = builders::event(
            EventKind::InvoiceCreateForContract,
            "acme",
            "inv1",
            json!({"contractId": "k1", "currency": "EUR", "dryRun": true, "preview": true}),
        );
        handler.handle(&decoded(&create)).await.unwrap();

        assert!(h.graph.has_edge("acme", &contract, RelationshipType::HasInvoice, &invoice));
        let node = h.ctx.graph.get_node("acme", &invoice).await.unwrap().unwrap();
        assert!(Invoice::from_node(&node).is_preview_cycle());
    }

    #[tokio::test]
    async fn fill_writes_lines_and_links_service_items() {
        let h = harness();
        let handler = InvoiceEventHandler::new(h.ctx.clone());
        let invoice = NodeRef::new(NodeLabel::Invoice, "inv1");
        let item = NodeRef::new(NodeLabel::ServiceLineItem, "s1");
        let line = NodeRef::new(NodeLabel::InvoiceLine, "l1");
        h.graph.seed("acme", &invoice, Properties::new().with("status", "INITIALIZED"));
        h.graph.seed("acme", &item, Properties::new());

        let fill = builders::event(
            EventKind::InvoiceFill,
            "acme",
            "inv1",
            json!({
                "amount": 100.0,
                "totalAmount": 120.0,
                "invoiceNumber": "INV-001",
                "status": "DUE",
                "invoiceLines": [{"id": "l1", "name": "Seats", "quantity": 1, "price": 100.0, "serviceLineItemId": "s1"}]
            }),
        );
        handler.handle(&decoded(&fill)).await.unwrap();
        handler.handle(&decoded(&fill)).await.unwrap();

        let props = h.graph.node("acme", &invoice).unwrap();
        assert_eq!(props.string("status"), "DUE");
        assert_eq!(props.string("number"), "INV-001");
        assert_eq!(h.graph.count(NodeLabel::InvoiceLine), 1);
        assert!(h.graph.has_edge("acme", &invoice, RelationshipType::HasInvoiceLine, &line));
        assert!(h.graph.has_edge("acme", &line, RelationshipType::Invoiced, &item));
    }

    #[tokio::test]
    async fn fill_of_missing_invoice_fails() {
        let h = harness();
        let handler = InvoiceEventHandler::new(h.ctx.clone());
        let fill = builders::event(
            EventKind::InvoiceFill,
            "acme",
            "inv1",
            json!({"status": "DUE"}),
        );
        let err = handler.handle(&decoded(&fill)).await.unwrap_err();
        assert!(matches!(err, HandlerError::NotFound { entity: "Invoice", .. }));
    }

    #[tokio::test]
    async fn void_then_delete() {
        let h = harness();
        let handler = InvoiceEventHandler::new(h.ctx.clone());
        let invoice = NodeRef::new(NodeLabel::Invoice, "inv1");
        let line = NodeRef::new(NodeLabel::InvoiceLine, "l1");
        h.graph.seed("acme", &invoice, Properties::new().with("status", "DUE"));
        h.graph.seed("acme", &line, Properties::new());
        h.graph.seed_edge(
            "acme",
            &invoice,
            RelationshipType::HasInvoiceLine,
            &line,
            Properties::new(),
        );

        handler
            .handle(&decoded(&builders::bare_event(EventKind::InvoiceVoid, "acme", "inv1")))
            .await
            .unwrap();
        assert_eq!(h.graph.node("acme", &invoice).unwrap().string("status"), "VOID");

        handler
            .handle(&decoded(&builders::bare_event(EventKind::InvoiceDelete, "acme", "inv1")))
            .await
            .unwrap();
        assert!(h.graph.node("acme", &invoice).is_none());
        assert!(h.graph.node("acme", &line).is_none());
    }
}

//! Service line item projections.
//!
//! Every change to a line item changes what its contract is worth, so each
//! handled event ends by asking the contract to recompute its LTV and the
//! owning organization to recompute its ARR forecast.

use super::{GraphContext, at_or_now};
use async_trait::async_trait;
use crm_projections_core::command::Command;
use crm_projections_core::events::{
    EventPayload, ServiceLineItemCloseEvent, ServiceLineItemCreateEvent, ServiceLineItemUpdateEvent,
};
use crm_projections_core::graph::{Direction, NodeLabel, NodeRef, Properties, RelationshipType};
use crm_projections_core::handler::{DecodedEvent, Handler, HandlerError};
use crm_projections_core::notifier::EventCompleted;

/// Projects service line item events.
#[derive(Debug, Clone)]
pub struct ServiceLineItemEventHandler {
    ctx: GraphContext,
}

impl ServiceLineItemEventHandler {
    /// Create the handler.
    #[must_use]
    pub const fn new(ctx: GraphContext) -> Self {
        Self { ctx }
    }

    fn node(event: &DecodedEvent) -> NodeRef {
        NodeRef::new(NodeLabel::ServiceLineItem, event.object_id.as_str())
    }

    async fn contract_of(
        &self,
        tenant: &str,
        item: &NodeRef,
    ) -> Result<Option<String>, HandlerError> {
        let contracts = self
            .ctx
            .graph
            .related(
                tenant,
                item,
                RelationshipType::HasService,
                Direction::Incoming,
                NodeLabel::Contract,
            )
            .await?;
        Ok(contracts.into_iter().next().map(|r| r.node.id))
    }

    /// Ask the contract and its organization to recompute their totals.
    async fn refresh_totals(
        &self,
        tenant: &str,
        contract_id: Option<String>,
    ) -> Result<(), HandlerError> {
        let Some(contract_id) = contract_id else {
            tracing::warn!(tenant, "Service line item has no contract, totals not refreshed");
            return Ok(());
        };
        self.ctx
            .send_best_effort(Command::RefreshContractLtv {
                tenant: tenant.to_string(),
                contract_id: contract_id.clone(),
                app_source: self.ctx.app_source.clone(),
            })
            .await;
        if let Some(organization) = self.ctx.organization_of_contract(tenant, &contract_id).await? {
            self.ctx
                .send_best_effort(Command::RefreshOrganizationArr {
                    tenant: tenant.to_string(),
                    organization_id: organization.id,
                    app_source: self.ctx.app_source.clone(),
                })
                .await;
        }
        Ok(())
    }

    async fn on_create(
        &self,
        event: &DecodedEvent,
        data: &ServiceLineItemCreateEvent,
    ) -> Result<(), HandlerError> {
        let item = Self::node(event);
        let created_at = at_or_now(data.created_at, &self.ctx);
        let mut on_create = self.ctx.source_properties(&data.source);
        on_create.set("createdAt", created_at);

        let parent_id = if data.parent_id.is_empty() {
            item.id.as_str()
        } else {
            data.parent_id.as_str()
        };
        let props = Properties::new()
            .with("name", data.name.as_str())
            .with("billed", data.billed.as_str())
            .with("quantity", data.quantity)
            .with("price", data.price)
            .with("parentId", parent_id)
            .with("comments", data.comments.as_str())
            .with("vatRate", data.vat_rate)
            .with("startedAt", data.started_at)
            .with("endedAt", data.ended_at)
            .with("isCanceled", false)
            .with("updatedAt", data.updated_at.unwrap_or(created_at));
        self.ctx.graph.merge_node(&event.tenant, &item, on_create, props).await?;

        let contract = NodeRef::new(NodeLabel::Contract, data.contract_id.as_str());
        self.ctx
            .link(&event.tenant, &contract, RelationshipType::HasService, &item, Properties::new())
            .await?;

        self.refresh_totals(
            &event.tenant,
            Some(data.contract_id.clone()).filter(|id| !id.is_empty()),
        )
        .await?;
        self.ctx
            .notify(EventCompleted::create(
                &event.tenant,
                NodeLabel::ServiceLineItem,
                &event.object_id,
            ))
            .await;
        Ok(())
    }

    async fn on_update(
        &self,
        event: &DecodedEvent,
        data: &ServiceLineItemUpdateEvent,
    ) -> Result<(), HandlerError> {
        let item = Self::node(event);
        let mut props = Properties::new()
            .with("name", data.name.as_str())
            .with("billed", data.billed.as_str())
            .with("quantity", data.quantity)
            .with("price", data.price)
            .with("comments", data.comments.as_str())
            .with("vatRate", data.vat_rate)
            .with("updatedAt", at_or_now(data.updated_at, &self.ctx));
        if let Some(started_at) = data.started_at {
            props.set("startedAt", started_at);
        }
        if !data.source.source.is_empty() {
            props.set("sourceOfTruth", data.source.source.as_str());
        }
        if !self.ctx.graph.update_node(&event.tenant, &item, props).await? {
            tracing::warn!(
                tenant = %event.tenant,
                service_line_item_id = %item.id,
                "Service line item not projected yet"
            );
            return Ok(());
        }

        let contract_id = self.contract_of(&event.tenant, &item).await?;
        self.refresh_totals(&event.tenant, contract_id).await?;
        self.ctx
            .notify(EventCompleted::update(
                &event.tenant,
                NodeLabel::ServiceLineItem,
                &event.object_id,
            ))
            .await;
        Ok(())
    }

    async fn on_delete(&self, event: &DecodedEvent) -> Result<(), HandlerError> {
        let item = Self::node(event);
        let contract_id = self.contract_of(&event.tenant, &item).await?;
        self.ctx.graph.delete_node(&event.tenant, &item).await?;
        self.refresh_totals(&event.tenant, contract_id).await?;
        self.ctx
            .notify(EventCompleted::delete(
                &event.tenant,
                NodeLabel::ServiceLineItem,
                &event.object_id,
            ))
            .await;
        Ok(())
    }

    async fn on_close(
        &self,
        event: &DecodedEvent,
        data: &ServiceLineItemCloseEvent,
    ) -> Result<(), HandlerError> {
        let item = Self::node(event);
        let now = self.ctx.now();
        let props = Properties::new()
            .with("endedAt", data.ended_at.unwrap_or(now))
            .with("isCanceled", data.is_canceled)
            .with("updatedAt", data.updated_at.unwrap_or(now));
        self.ctx.graph.update_node(&event.tenant, &item, props).await?;

        let contract_id = self.contract_of(&event.tenant, &item).await?;
        self.refresh_totals(&event.tenant, contract_id).await
    }

    async fn on_paused(&self, event: &DecodedEvent, paused: bool) -> Result<(), HandlerError> {
        let item = Self::node(event);
        let props = Properties::new()
            .with("paused", paused)
            .with("updatedAt", self.ctx.now());
        self.ctx.graph.update_node(&event.tenant, &item, props).await?;

        let contract_id = self.contract_of(&event.tenant, &item).await?;
        self.refresh_totals(&event.tenant, contract_id).await
    }
}

#[async_trait]
impl Handler for ServiceLineItemEventHandler {
    fn name(&self) -> &'static str {
        "ServiceLineItemEventHandler"
    }

    async fn handle(&self, event: &DecodedEvent) -> Result<(), HandlerError> {
        match &event.payload {
            EventPayload::ServiceLineItemCreate(data) => self.on_create(event, data).await,
            EventPayload::ServiceLineItemUpdate(data) => self.on_update(event, data).await,
            EventPayload::ServiceLineItemDelete(_) => self.on_delete(event).await,
            EventPayload::ServiceLineItemClose(data) => self.on_close(event, data).await,
            EventPayload::ServiceLineItemPause(_) => self.on_paused(event, true).await,
            EventPayload::ServiceLineItemResume(_) => self.on_paused(event, false).await,
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
    use serde_json::json;

    fn seed_contract(h: &Harness) -> NodeRef {
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
        contract
    }

    #[tokio::test]
    async fn create_links_contract_and_refreshes_totals() {
        let h = harness();
        let handler = ServiceLineItemEventHandler::new(h.ctx.clone());
        let contract = seed_contract(&h);
        let item = NodeRef::new(NodeLabel::ServiceLineItem, "s1");

        let create = builders::event(
            EventKind::ServiceLineItemCreate,
            "acme",
            "s1",
            json!({"name": "Seats", "billed": "MONTHLY", "quantity": 10, "price": 12.5, "contractId": "k1"}),
        );
        handler.handle(&decoded(&create)).await.unwrap();

        let props = h.graph.node("acme", &item).unwrap();
        assert_eq!(props.string("parentId"), "s1");
        assert_eq!(props.get_i64("quantity"), Some(10));
        assert!(h.graph.has_edge("acme", &contract, RelationshipType::HasService, &item));
        assert_eq!(h.commands.sent_names(), vec!["RefreshContractLtv", "RefreshOrganizationArr"]);
    }

    #[tokio::test]
    async fn close_and_pause_refresh_totals() {
        let h = harness();
        let handler = ServiceLineItemEventHandler::new(h.ctx.clone());
        let contract = seed_contract(&h);
        let item = NodeRef::new(NodeLabel::ServiceLineItem, "s1");
        h.graph.seed("acme", &item, Properties::new());
        h.graph.seed_edge(
            "acme",
            &contract,
            RelationshipType::HasService,
            &item,
            Properties::new(),
        );

        let close = builders::event(
            EventKind::ServiceLineItemClose,
            "acme",
            "s1",
            json!({"isCanceled": true}),
        );
        handler.handle(&decoded(&close)).await.unwrap();
        let pause = builders::event(EventKind::ServiceLineItemPause, "acme", "s1", json!({}));
        handler.handle(&decoded(&pause)).await.unwrap();

        let props = h.graph.node("acme", &item).unwrap();
        assert_eq!(props.get_bool("isCanceled"), Some(true));
        assert!(props.get_datetime("endedAt").is_some());
        assert_eq!(props.get_bool("paused"), Some(true));
        assert_eq!(h.commands.sent().len(), 4);
    }

    #[tokio::test]
    async fn delete_refreshes_the_former_contract() {
        let h = harness();
        let handler = ServiceLineItemEventHandler::new(h.ctx.clone());
        let contract = seed_contract(&h);
        let item = NodeRef::new(NodeLabel::ServiceLineItem, "s1");
        h.graph.seed("acme", &item, Properties::new());
        h.graph.seed_edge(
            "acme",
            &contract,
            RelationshipType::HasService,
            &item,
            Properties::new(),
        );

        let delete = builders::event(EventKind::ServiceLineItemDelete, "acme", "s1", json!({}));
        handler.handle(&decoded(&delete)).await.unwrap();

        assert!(h.graph.node("acme", &item).is_none());
        assert!(matches!(
            &h.commands.sent()[0],
            Command::RefreshContractLtv { contract_id, .. } if contract_id == "k1"
        ));
    }

    #[tokio::test]
    async fn update_of_unknown_item_is_skipped() {
        let h = harness();
        let handler = ServiceLineItemEventHandler::new(h.ctx.clone());

        let update = builders::event(
            EventKind::ServiceLineItemUpdate,
            "acme",
            "s9",
            json!({"price": 1.0}),
        );
        handler.handle(&decoded(&update)).await.unwrap();

        assert!(h.commands.sent().is_empty());
        assert!(h.notifier.notified().is_empty());
    }
}

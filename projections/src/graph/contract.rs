//! Contract projections.
//!
//! A contract's status is never sent by the command side; it is derived here
//! from the contract's dates, approval and active renewal every time a
//! `RefreshStatus` event arrives. A status change ripples out: the owning
//! organization may become (or stop being) a customer, the lifetime value is
//! recomputed, and an ended contract's renewal forecast is zeroed.

use super::{GraphContext, at_or_now};
use async_trait::async_trait;
use crm_projections_core::command::Command;
use crm_projections_core::contract::{
    ContractStatus, StatusInputs, calculate_ltv, derive_contract_status,
};
use crm_projections_core::events::{ContractDeleteEvent, EventPayload};
use crm_projections_core::graph::{
    Direction, GraphNode, NodeLabel, NodeRef, Properties, RelationshipType,
};
use crm_projections_core::handler::{DecodedEvent, Handler, HandlerError};
use crm_projections_core::model::{Contract, Invoice, Opportunity, Organization, ServiceLineItem};
use crm_projections_core::notifier::EventCompleted;
use serde_json::json;

/// Timeline action recorded when the derived status changes.
pub const ACTION_CONTRACT_STATUS_UPDATED: &str = "CONTRACT_STATUS_UPDATED";

/// Timeline action recorded when a contract rolls over to a new renewal.
pub const ACTION_CONTRACT_RENEWED: &str = "CONTRACT_RENEWED";

/// Organization relationship values set from contract statuses.
pub mod relationship {
    /// Has at least one running contract
    pub const CUSTOMER: &str = "CUSTOMER";
    /// Was a customer, every contract ended
    pub const FORMER_CUSTOMER: &str = "FORMER_CUSTOMER";
}

/// Onboarding status set when a contract goes live.
pub const ONBOARDING_NOT_STARTED: &str = "NOT_STARTED";

/// Projects contract events.
#[derive(Debug, Clone)]
pub struct ContractEventHandler {
    ctx: GraphContext,
    onboarding_enabled: bool,
}

impl ContractEventHandler {
    /// Create the handler with onboarding disabled.
    #[must_use]
    pub const fn new(ctx: GraphContext) -> Self {
        Self {
            ctx,
            onboarding_enabled: false,
        }
    }

    /// Start onboarding when a contract goes live.
    #[must_use]
    pub const fn with_onboarding(mut self, enabled: bool) -> Self {
        self.onboarding_enabled = enabled;
        self
    }

    fn node(event: &DecodedEvent) -> NodeRef {
        NodeRef::new(NodeLabel::Contract, event.object_id.as_str())
    }

    async fn load(&self, tenant: &str, contract: &NodeRef) -> Result<Contract, HandlerError> {
        self.ctx
            .graph
            .get_node(tenant, contract)
            .await?
            .map(|node| Contract::from_node(&node))
            .ok_or_else(|| HandlerError::NotFound {
                entity: "Contract",
                id: contract.id.clone(),
            })
    }

    async fn active_renewal(
        &self,
        tenant: &str,
        contract: &NodeRef,
    ) -> Result<Option<Opportunity>, HandlerError> {
        let renewals = self
            .ctx
            .graph
            .related(
                tenant,
                contract,
                RelationshipType::ActiveRenewal,
                Direction::Outgoing,
                NodeLabel::Opportunity,
            )
            .await?;
        Ok(renewals.first().map(|r| Opportunity::from_node(&r.node)))
    }

    async fn refresh_ltv_command(&self, tenant: &str, contract_id: &str) {
        self.ctx
            .send_best_effort(Command::RefreshContractLtv {
                tenant: tenant.to_string(),
                contract_id: contract_id.to_string(),
                app_source: self.ctx.app_source.clone(),
            })
            .await;
    }

    async fn completed(&self, event: &DecodedEvent) {
        self.ctx
            .notify(EventCompleted::update(&event.tenant, NodeLabel::Contract, &event.object_id))
            .await;
    }

    async fn on_rollout_renewal_opportunity(
        &self,
        event: &DecodedEvent,
    ) -> Result<(), HandlerError> {
        let node = Self::node(event);
        let contract = self.load(&event.tenant, &node).await?;
        if contract.length_in_months <= 0 {
            return Ok(());
        }

        match self.active_renewal(&event.tenant, &node).await {
            Ok(Some(renewal)) => {
                self.ctx
                    .send(Command::CloseWonOpportunity {
                        tenant: event.tenant.clone(),
                        opportunity_id: renewal.id,
                        app_source: self.ctx.app_source.clone(),
                    })
                    .await?;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(
                    tenant = %event.tenant,
                    contract_id = %node.id,
                    error = %e,
                    "Failed to read active renewal"
                );
            }
        }

        self.refresh_ltv_command(&event.tenant, &node.id).await;

        let content = format!("{} renewed", contract.name);
        if let Err(e) = self
            .ctx
            .create_action(
                &event.tenant,
                &node,
                ACTION_CONTRACT_RENEWED,
                &content,
                &json!({"status": "Renewed"}),
            )
            .await
        {
            tracing::error!(
                tenant = %event.tenant,
                contract_id = %node.id,
                error = %e,
                "Failed to record renewal action"
            );
        }

        self.completed(event).await;
        Ok(())
    }

    async fn on_refresh_status(&self, event: &DecodedEvent) -> Result<(), HandlerError> {
        let node = Self::node(event);
        let contract = self.load(&event.tenant, &node).await?;
        let renewal = if contract.auto_renew {
            None
        } else {
            self.active_renewal(&event.tenant, &node).await?
        };
        let inputs = StatusInputs::from_contract(
            &contract,
            renewal.as_ref().and_then(|r| r.renewed_at),
        );
        let status = derive_contract_status(&inputs, self.ctx.now());
        let changed = status != contract.status;

        self.ctx
            .graph
            .update_node(
                &event.tenant,
                &node,
                Properties::new()
                    .with("status", status.as_str())
                    .with("updatedAt", self.ctx.now()),
            )
            .await?;
        tracing::debug!(
            tenant = %event.tenant,
            contract_id = %node.id,
            status = %status,
            changed,
            "Contract status derived"
        );

        let organization = self.ctx.organization_of_contract(&event.tenant, &node.id).await?;

        if changed {
            if let Some(organization) = &organization {
                if let Err(e) =
                    self.update_organization_relationship(&event.tenant, organization).await
                {
                    tracing::error!(
                        tenant = %event.tenant,
                        contract_id = %node.id,
                        error = %e,
                        "Failed to update organization relationship"
                    );
                }
            }
            self.refresh_ltv_command(&event.tenant, &node.id).await;
        }

        if status == ContractStatus::Ended {
            self.end_renewal(&event.tenant, &node, &contract).await;
            if let Err(e) = self.delete_preview_invoices(&event.tenant, &node).await {
                tracing::error!(
                    tenant = %event.tenant,
                    contract_id = %node.id,
                    error = %e,
                    "Failed to delete preview invoices"
                );
            }
        }

        if changed {
            self.record_status_change(&event.tenant, &node, status, &contract).await;
        }

        if status == ContractStatus::Live {
            if let Some(organization) = &organization {
                self.start_onboarding_if_eligible(&event.tenant, &node.id, organization).await;
            }
        }

        self.completed(event).await;
        Ok(())
    }

    /// Derive the organization's relationship from all of its contracts.
    async fn update_organization_relationship(
        &self,
        tenant: &str,
        organization: &GraphNode,
    ) -> Result<(), HandlerError> {
        let current = Organization::from_node(organization);
        let contracts = self
            .ctx
            .graph
            .related(
                tenant,
                &organization.node_ref(),
                RelationshipType::HasContract,
                Direction::Outgoing,
                NodeLabel::Contract,
            )
            .await?;
        let statuses: Vec<ContractStatus> = contracts
            .iter()
            .map(|c| Contract::from_node(&c.node))
            .filter(|c| !c.deleted)
            .map(|c| c.status)
            .collect();

        let Some((relationship, stage)) = relationship_for(&statuses, &current) else {
            return Ok(());
        };
        self.ctx
            .send(Command::UpdateOrganizationRelationship {
                tenant: tenant.to_string(),
                organization_id: current.id,
                relationship: relationship.to_string(),
                stage: stage.to_string(),
                app_source: self.ctx.app_source.clone(),
            })
            .await?;
        Ok(())
    }

    /// Zero the forecast of an ended contract's renewal and pin its date to the end date.
    async fn end_renewal(&self, tenant: &str, node: &NodeRef, contract: &Contract) {
        let renewal = match self.active_renewal(tenant, node).await {
            Ok(Some(renewal)) => renewal,
            Ok(None) => return,
            Err(e) => {
                tracing::error!(
                    tenant,
                    contract_id = %node.id,
                    error = %e,
                    "Failed to read active renewal"
                );
                return;
            }
        };
        self.ctx
            .send_best_effort(Command::UpdateRenewalOpportunity {
                tenant: tenant.to_string(),
                opportunity_id: renewal.id,
                renewed_at: contract.ended_at,
                amount: 0.0,
                app_source: self.ctx.app_source.clone(),
            })
            .await;
    }

    async fn delete_preview_invoices(
        &self,
        tenant: &str,
        node: &NodeRef,
    ) -> Result<(), HandlerError> {
        let invoices = self
            .ctx
            .graph
            .related(
                tenant,
                node,
                RelationshipType::HasInvoice,
                Direction::Outgoing,
                NodeLabel::Invoice,
            )
            .await?;
        for invoice in invoices.iter().filter(|i| Invoice::from_node(&i.node).is_preview_cycle()) {
            self.ctx.graph.delete_node(tenant, &invoice.node.node_ref()).await?;
        }
        Ok(())
    }

    async fn record_status_change(
        &self,
        tenant: &str,
        node: &NodeRef,
        status: ContractStatus,
        contract: &Contract,
    ) {
        let name = contract.display_name();
        let content = match status {
            ContractStatus::Live => format!("{name} is now live"),
            ContractStatus::Ended => format!("{name} has ended"),
            ContractStatus::OutOfContract => format!("{name} is now out of contract"),
            other => format!("{name} is now {other}"),
        };
        let metadata = json!({
            "status": status.as_str(),
            "contract-name": name,
            "comment": content,
        });
        if let Err(e) = self
            .ctx
            .create_action(tenant, node, ACTION_CONTRACT_STATUS_UPDATED, &content, &metadata)
            .await
        {
            tracing::error!(
                tenant,
                contract_id = %node.id,
                error = %e,
                "Failed to record status action"
            );
        }
    }

    async fn start_onboarding_if_eligible(
        &self,
        tenant: &str,
        contract_id: &str,
        organization: &GraphNode,
    ) {
        if !self.onboarding_enabled {
            return;
        }
        let current = Organization::from_node(organization);
        if !matches!(current.onboarding_status.as_str(), "" | "NOT_APPLICABLE") {
            return;
        }
        self.ctx
            .send_best_effort(Command::UpdateOnboardingStatus {
                tenant: tenant.to_string(),
                organization_id: current.id,
                status: ONBOARDING_NOT_STARTED.to_string(),
                comments: String::new(),
                caused_by_contract_id: contract_id.to_string(),
                app_source: self.ctx.app_source.clone(),
            })
            .await;
    }

    async fn on_refresh_ltv(&self, event: &DecodedEvent) -> Result<(), HandlerError> {
        let node = Self::node(event);
        let contract = self.load(&event.tenant, &node).await?;

        let ltv = if contract.status.accrues_ltv() {
            let items = self
                .ctx
                .graph
                .related(
                    &event.tenant,
                    &node,
                    RelationshipType::HasService,
                    Direction::Outgoing,
                    NodeLabel::ServiceLineItem,
                )
                .await?;
            let items: Vec<ServiceLineItem> = items
                .iter()
                .map(|i| ServiceLineItem::from_node(&i.node))
                .collect();
            calculate_ltv(&contract, &items, self.ctx.now())
        } else {
            0.0
        };

        self.ctx
            .graph
            .update_node(&event.tenant, &node, Properties::new().with("ltv", ltv))
            .await?;

        match self.ctx.organization_of_contract(&event.tenant, &node.id).await {
            Ok(Some(organization)) => {
                self.ctx
                    .send_best_effort(Command::RefreshOrganizationDerivedData {
                        tenant: event.tenant.clone(),
                        organization_id: organization.id,
                        app_source: self.ctx.app_source.clone(),
                    })
                    .await;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(
                    tenant = %event.tenant,
                    contract_id = %node.id,
                    error = %e,
                    "Failed to read contract organization"
                );
                return Ok(());
            }
        }

        self.completed(event).await;
        Ok(())
    }

    async fn on_delete(
        &self,
        event: &DecodedEvent,
        data: &ContractDeleteEvent,
    ) -> Result<(), HandlerError> {
        let node = Self::node(event);
        let organization = match self.ctx.organization_of_contract(&event.tenant, &node.id).await {
            Ok(Some(organization)) => organization,
            Ok(None) => {
                tracing::error!(
                    tenant = %event.tenant,
                    contract_id = %node.id,
                    "Organization not found for contract"
                );
                return Ok(());
            }
            Err(e) => {
                tracing::error!(
                    tenant = %event.tenant,
                    contract_id = %node.id,
                    error = %e,
                    "Failed to read contract organization"
                );
                return Ok(());
            }
        };

        self.ctx
            .graph
            .update_node(
                &event.tenant,
                &node,
                Properties::new()
                    .with("deleted", true)
                    .with("updatedAt", at_or_now(data.updated_at, &self.ctx)),
            )
            .await?;

        self.ctx
            .refresh_organization_renewals(&event.tenant, &organization.id)
            .await;
        self.delete_preview_invoices(&event.tenant, &node).await?;

        self.ctx
            .notify(EventCompleted::delete(&event.tenant, NodeLabel::Contract, &event.object_id))
            .await;
        Ok(())
    }
}

/// Relationship and stage an organization should move to, or `None` when it stays.
///
/// Any running contract makes it a customer; a customer whose contracts all
/// ended becomes a former customer.
fn relationship_for(
    statuses: &[ContractStatus],
    organization: &Organization,
) -> Option<(&'static str, &'static str)> {
    let running = statuses
        .iter()
        .any(|s| matches!(s, ContractStatus::Live | ContractStatus::OutOfContract));
    let ended = statuses.iter().any(|s| *s == ContractStatus::Ended);

    if running {
        (organization.relationship != relationship::CUSTOMER)
            .then_some((relationship::CUSTOMER, "ONBOARDING"))
    } else if ended && organization.relationship == relationship::CUSTOMER {
        Some((relationship::FORMER_CUSTOMER, ""))
    } else {
        None
    }
}

#[async_trait]
impl Handler for ContractEventHandler {
    fn name(&self) -> &'static str {
        "ContractEventHandler"
    }

    async fn handle(&self, event: &DecodedEvent) -> Result<(), HandlerError> {
        match &event.payload {
            EventPayload::ContractRolloutRenewalOpportunity(_) => {
                self.on_rollout_renewal_opportunity(event).await
            }
            EventPayload::ContractRefreshStatus(_) => self.on_refresh_status(event).await,
            EventPayload::ContractRefreshLtv(_) => self.on_refresh_ltv(event).await,
            EventPayload::ContractDelete(data) => self.on_delete(event, data).await,
            other => Err(HandlerError::unexpected(self.name(), other)),
        }
    }
}

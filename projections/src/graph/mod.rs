//! Graph projection handlers.
//!
//! One handler per aggregate family. Each handler writes its aggregate's
//! nodes and edges through the [`GraphRepository`], asks other aggregates to
//! recompute through follow-up [`Command`]s and announces what changed through
//! the [`EventCompletedNotifier`].
//!
//! All writes are MERGE based, so a redelivered event leaves the graph as it
//! was after the first delivery.

use chrono::{DateTime, Utc};
use crm_projections_core::command::{Command, CommandAck, CommandClient};
use crm_projections_core::environment::Clock;
use crm_projections_core::events::{ExternalSystem, Source};
use crm_projections_core::graph::{
    Direction, GraphNode, GraphRepository, NodeLabel, NodeRef, Properties, RelationshipType,
};
use crm_projections_core::handler::HandlerError;
use crm_projections_core::notifier::{EventCompleted, EventCompletedNotifier};
use crm_projections_runtime::RetryPolicy;
use std::sync::Arc;

pub mod bank_account;
pub mod comment;
pub mod contact;
pub mod contract;
pub mod email;
pub mod invoice;
pub mod issue;
pub mod job_role;
pub mod location;
pub mod log_entry;
pub mod opportunity;
pub mod organization;
pub mod phone_number;
pub mod reminder;
pub mod service_line_item;
pub mod tenant;
pub mod user;

pub use bank_account::BankAccountEventHandler;
pub use comment::CommentEventHandler;
pub use contact::ContactEventHandler;
pub use contract::ContractEventHandler;
pub use email::EmailEventHandler;
pub use invoice::InvoiceEventHandler;
pub use issue::IssueEventHandler;
pub use job_role::JobRoleEventHandler;
pub use location::LocationEventHandler;
pub use log_entry::LogEntryEventHandler;
pub use opportunity::OpportunityEventHandler;
pub use organization::OrganizationEventHandler;
pub use phone_number::PhoneNumberEventHandler;
pub use reminder::ReminderEventHandler;
pub use service_line_item::ServiceLineItemEventHandler;
pub use tenant::TenantEventHandler;
pub use user::UserEventHandler;

/// Default `appSource` stamped on follow-up commands and created nodes.
pub const DEFAULT_APP_SOURCE: &str = "event-processing-platform-subscribers";

/// Dependencies shared by every graph handler.
#[derive(Clone)]
pub struct GraphContext {
    /// Read model
    pub graph: Arc<dyn GraphRepository>,
    /// Follow-up commands, already wrapped with retries
    pub commands: Arc<dyn CommandClient>,
    /// Completion signals
    pub notifier: Arc<dyn EventCompletedNotifier>,
    /// Time source
    pub clock: Arc<dyn Clock>,
    /// `appSource` of everything this process writes
    pub app_source: String,
    /// How long to wait for a command's result to become visible
    pub visibility: RetryPolicy,
}

impl std::fmt::Debug for GraphContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphContext")
            .field("app_source", &self.app_source)
            .field("visibility", &self.visibility)
            .finish_non_exhaustive()
    }
}

impl GraphContext {
    /// Context with the default app source and visibility policy.
    #[must_use]
    pub fn new(
        graph: Arc<dyn GraphRepository>,
        commands: Arc<dyn CommandClient>,
        notifier: Arc<dyn EventCompletedNotifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            graph,
            commands,
            notifier,
            clock,
            app_source: DEFAULT_APP_SOURCE.to_string(),
            visibility: RetryPolicy::visibility(),
        }
    }

    /// Override the app source.
    #[must_use]
    pub fn with_app_source(mut self, app_source: impl Into<String>) -> Self {
        self.app_source = app_source.into();
        self
    }

    /// Override the visibility policy.
    #[must_use]
    pub fn with_visibility(mut self, visibility: RetryPolicy) -> Self {
        self.visibility = visibility;
        self
    }

    /// Current time.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Publish a completion signal. Failures are logged only.
    pub async fn notify(&self, completed: EventCompleted) {
        let entity = completed.entity;
        let entity_id = completed.entity_id.clone();
        if let Err(e) = self.notifier.notify(completed).await {
            tracing::warn!(
                entity = %entity,
                entity_id = %entity_id,
                error = %e,
                "Failed to publish event completed"
            );
        }
    }

    /// Send a follow-up command.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::Command`] if the command failed after retries.
    pub async fn send(&self, command: Command) -> Result<CommandAck, HandlerError> {
        Ok(self.commands.send(&command).await?)
    }

    /// Send a follow-up command whose failure must not fail the handler.
    pub async fn send_best_effort(&self, command: Command) {
        if let Err(e) = self.commands.send(&command).await {
            tracing::warn!(
                command = command.name(),
                target = command.target_id(),
                error = %e,
                "Follow-up command failed"
            );
        }
    }

    /// Ask an organization to recompute its renewal summary and ARR forecast.
    pub async fn refresh_organization_renewals(&self, tenant: &str, organization_id: &str) {
        self.send_best_effort(Command::RefreshOrganizationRenewalSummary {
            tenant: tenant.to_string(),
            organization_id: organization_id.to_string(),
            app_source: self.app_source.clone(),
        })
        .await;
        self.send_best_effort(Command::RefreshOrganizationArr {
            tenant: tenant.to_string(),
            organization_id: organization_id.to_string(),
            app_source: self.app_source.clone(),
        })
        .await;
    }

    /// Link two nodes, logging when either end is not projected yet.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::Graph`] if the write fails.
    pub async fn link(
        &self,
        tenant: &str,
        from: &NodeRef,
        rel: RelationshipType,
        to: &NodeRef,
        properties: Properties,
    ) -> Result<bool, HandlerError> {
        let linked = self.graph.merge_relationship(tenant, from, rel, to, properties).await?;
        if !linked {
            tracing::warn!(
                tenant,
                from = %from,
                rel = %rel,
                to = %to,
                "Link skipped, endpoint missing"
            );
        }
        Ok(linked)
    }

    /// Record a timeline action on `entity`.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::Graph`] if the write fails.
    pub async fn create_action(
        &self,
        tenant: &str,
        entity: &NodeRef,
        action_type: &str,
        content: &str,
        metadata: &serde_json::Value,
    ) -> Result<String, HandlerError> {
        let action = NodeRef::new(NodeLabel::Action, uuid::Uuid::new_v4().to_string());
        let now = self.now();
        self.graph
            .merge_node(
                tenant,
                &action,
                Properties::new()
                    .with("type", action_type)
                    .with("content", content)
                    .with("metadata", metadata.to_string())
                    .with("source", "openline")
                    .with("appSource", self.app_source.as_str())
                    .with("createdAt", now),
                Properties::new(),
            )
            .await?;
        self.link(tenant, &action, RelationshipType::ActionOn, entity, Properties::new())
            .await?;
        Ok(action.id)
    }

    /// Link `node` to the external system record it was imported from.
    /// No-op when the event carries no external reference.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::Graph`] if the write fails.
    pub async fn link_external_system(
        &self,
        tenant: &str,
        node: &NodeRef,
        external: &ExternalSystem,
    ) -> Result<(), HandlerError> {
        if !external.available() {
            return Ok(());
        }
        let system = NodeRef::new(NodeLabel::ExternalSystem, external.external_system_id.as_str());
        self.graph
            .merge_node(
                tenant,
                &system,
                Properties::new().with("createdAt", self.now()),
                Properties::new(),
            )
            .await?;
        self.link(
            tenant,
            node,
            RelationshipType::IsLinkedWith,
            &system,
            Properties::new()
                .with("externalId", external.external_id.as_str())
                .with_if(
                    !external.external_url.is_empty(),
                    "externalUrl",
                    external.external_url.as_str(),
                )
                .with_if(
                    !external.external_source.is_empty(),
                    "externalSource",
                    external.external_source.as_str(),
                )
                .with("syncDate", external.sync_date.unwrap_or_else(|| self.now())),
        )
        .await?;
        Ok(())
    }

    /// Organization owning a contract, found over its `HAS_CONTRACT` edge.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::Graph`] if the read fails.
    pub async fn organization_of_contract(
        &self,
        tenant: &str,
        contract_id: &str,
    ) -> Result<Option<GraphNode>, HandlerError> {
        let contract = NodeRef::new(NodeLabel::Contract, contract_id);
        let owners = self
            .graph
            .related(
                tenant,
                &contract,
                RelationshipType::HasContract,
                Direction::Incoming,
                NodeLabel::Organization,
            )
            .await?;
        Ok(owners.into_iter().next().map(|r| r.node))
    }

    /// Link a phone number to its owner. A primary link demotes the owner's
    /// other phone numbers.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::Graph`] if a write fails.
    pub async fn link_phone_number(
        &self,
        tenant: &str,
        owner: &NodeRef,
        phone_number_id: &str,
        primary: bool,
        label: &str,
    ) -> Result<bool, HandlerError> {
        let phone = NodeRef::new(NodeLabel::PhoneNumber, phone_number_id);
        if primary {
            let linked = self
                .graph
                .related(
                    tenant,
                    owner,
                    RelationshipType::Has,
                    Direction::Outgoing,
                    NodeLabel::PhoneNumber,
                )
                .await?;
            for other in linked.iter().filter(|r| r.node.id != phone.id) {
                self.graph
                    .merge_relationship(
                        tenant,
                        owner,
                        RelationshipType::Has,
                        &other.node.node_ref(),
                        Properties::new().with("primary", false),
                    )
                    .await?;
            }
        }
        self.link(
            tenant,
            owner,
            RelationshipType::Has,
            &phone,
            Properties::new().with("primary", primary).with("label", label),
        )
        .await
    }

    /// `source`, `sourceOfTruth` and `appSource` of a created node.
    #[must_use]
    pub fn source_properties(&self, source: &Source) -> Properties {
        let app_source = if source.app_source.is_empty() {
            self.app_source.as_str()
        } else {
            &source.app_source
        };
        Properties::new()
            .with("source", source.source.as_str())
            .with("sourceOfTruth", source.source_of_truth_or_source())
            .with("appSource", app_source)
    }
}

/// Timestamp of the event, falling back to now.
pub(crate) fn at_or_now(at: Option<DateTime<Utc>>, ctx: &GraphContext) -> DateTime<Utc> {
    at.unwrap_or_else(|| ctx.now())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod test_support {
    use super::GraphContext;
    use crm_projections_core::command::CommandClient;
    use crm_projections_core::event::StoredEvent;
    use crm_projections_core::event_kind::EventKind;
    use crm_projections_core::handler::DecodedEvent;
    use crm_projections_runtime::RetryPolicy;
    use crm_projections_testing::{
        InMemoryGraphRepository, RecordingCommandClient, RecordingNotifier, test_clock,
    };
    use std::sync::Arc;
    use std::time::Duration;

    pub(crate) struct Harness {
        pub graph: InMemoryGraphRepository,
        pub commands: Arc<RecordingCommandClient>,
        pub notifier: RecordingNotifier,
        pub ctx: GraphContext,
    }

    pub(crate) fn harness() -> Harness {
        harness_with(RecordingCommandClient::new())
    }

    pub(crate) fn harness_with(commands: RecordingCommandClient) -> Harness {
        let graph = InMemoryGraphRepository::new();
        let commands = Arc::new(commands);
        let notifier = RecordingNotifier::new();
        let ctx = GraphContext::new(
            Arc::new(graph.clone()),
            Arc::clone(&commands) as Arc<dyn CommandClient>,
            Arc::new(notifier.clone()),
            Arc::new(test_clock()),
        )
        .with_visibility(RetryPolicy {
            max_retries: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
            multiplier: 1.0,
            jitter: false,
        });
        Harness {
            graph,
            commands,
            notifier,
            ctx,
        }
    }

    pub(crate) fn decoded(event: &StoredEvent) -> DecodedEvent {
        let kind: EventKind = event.event_type.parse().unwrap();
        DecodedEvent::decode(event, kind).unwrap()
    }
}

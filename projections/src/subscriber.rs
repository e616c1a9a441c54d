//! The three subscribers and their routing tables.
//!
//! | Subscriber     | Routes                                   | Unrouted kinds |
//! |----------------|------------------------------------------|----------------|
//! | `graph`        | every graph handler, best effort         | parked         |
//! | `enrich`       | `V1_EMAIL_VALIDATE`                      | ignored        |
//! | `organization` | `V1_ORGANIZATION_REQUEST_ENRICH`, create | ignored        |

use crate::config::{ProjectionsConfig, SubscriptionConfig};
use crate::dispatcher::{DispatchPolicy, EventDispatcher};
use crate::enrich::{EmailValidateHandler, EmailValidationApi};
use crate::graph::{
    BankAccountEventHandler, CommentEventHandler, ContactEventHandler, ContractEventHandler,
    EmailEventHandler, GraphContext, InvoiceEventHandler, IssueEventHandler, JobRoleEventHandler,
    LocationEventHandler, LogEntryEventHandler, OpportunityEventHandler, OrganizationEventHandler,
    PhoneNumberEventHandler, ReminderEventHandler, ServiceLineItemEventHandler, TenantEventHandler,
    UserEventHandler,
};
use crate::organization::{EnrichmentApi, OrganizationEnrichmentHandler};
use crate::pool::{PoolError, WorkerPool};
use crm_projections_core::event_kind::EventKind;
use crm_projections_core::handler::{FailurePolicy, HandlerRegistry};
use crm_projections_core::subscription::{ParkedEventLog, SubscriptionConnector};
use std::sync::Arc;
use tokio::sync::watch;

/// Kinds the graph subscriber acknowledges without projecting. They are
/// consumed by other services or carry nothing the graph stores.
pub const GRAPH_IGNORED: &[EventKind] = &[
    EventKind::EventCompleted,
    EventKind::PhoneNumberValidate,
    EventKind::PhoneNumberValidationSkipped,
    EventKind::EmailCreate,
    EventKind::EmailUpdate,
    EventKind::EmailUpsert,
    EventKind::EmailValidate,
    EventKind::EmailValidationFailed,
    EventKind::EmailValidated,
    EventKind::OrganizationEmailLink,
    EventKind::OrganizationEmailUnlink,
    EventKind::OrganizationLinkDomain,
    EventKind::OrganizationAddSocial,
    EventKind::OrganizationHide,
    EventKind::OrganizationAddTag,
    EventKind::OrganizationRemoveTag,
    EventKind::OrganizationRefreshLastTouchpoint,
    EventKind::OrganizationRequestRenewalForecast,
    EventKind::OrganizationRequestNextCycleDate,
    EventKind::OrganizationUpdateRenewalLikelihood,
    EventKind::OrganizationUpdateRenewalForecast,
    EventKind::OrganizationUpdateBillingDetails,
    EventKind::OrganizationRequestScrapeByWebsite,
    EventKind::OrganizationAdjustIndustry,
    EventKind::OrganizationRequestEnrich,
    EventKind::OrganizationUpdateOwner,
    EventKind::OrganizationUpdateOwnerNotification,
    EventKind::UserEmailLink,
    EventKind::UserEmailUnlink,
    EventKind::LocationValidationSkipped,
    EventKind::LogEntryAddTag,
    EventKind::LogEntryRemoveTag,
    EventKind::ContractCreate,
    EventKind::ContractUpdate,
    EventKind::ContractUpdateStatus,
    EventKind::InvoiceFillRequested,
    EventKind::InvoiceUpdate,
    EventKind::InvoicePdfRequested,
    EventKind::InvoicePay,
    EventKind::InvoicePaid,
    EventKind::InvoicePayNotification,
    EventKind::InvoiceRemindNotification,
    EventKind::ReminderNotification,
];

/// Routing table of the graph subscriber.
///
/// Every route is [`FailurePolicy::BestEffort`]: a failing projection is
/// logged and the stream moves on. Kinds neither routed nor in
/// [`GRAPH_IGNORED`] are rejected by the dispatcher and parked.
#[must_use]
pub fn graph_registry(ctx: &GraphContext, onboarding_enabled: bool) -> HandlerRegistry {
    use EventKind as K;
    let best_effort = FailurePolicy::BestEffort;

    HandlerRegistry::new()
        .register(
            &[
                K::PhoneNumberCreate,
                K::PhoneNumberUpdate,
                K::PhoneNumberValidationFailed,
                K::PhoneNumberValidated,
            ],
            Arc::new(PhoneNumberEventHandler::new(ctx.clone())),
            best_effort,
        )
        .register(
            &[K::EmailValidatedV2, K::EmailDelete],
            Arc::new(EmailEventHandler::new(ctx.clone())),
            best_effort,
        )
        .register(
            &[K::ContactPhoneNumberLink, K::ContactLocationLink],
            Arc::new(ContactEventHandler::new(ctx.clone())),
            best_effort,
        )
        .register(
            &[
                K::OrganizationCreate,
                K::OrganizationUpdate,
                K::OrganizationPhoneNumberLink,
                K::OrganizationLocationLink,
                K::OrganizationUnlinkDomain,
                K::OrganizationRemoveSocial,
                K::OrganizationShow,
                K::OrganizationRefreshArr,
                K::OrganizationRefreshRenewalSummary,
                K::OrganizationRefreshDerivedData,
                K::OrganizationUpsertCustomField,
                K::OrganizationAddParent,
                K::OrganizationRemoveParent,
                K::OrganizationUpdateOnboardingStatus,
                K::OrganizationCreateBillingProfile,
                K::OrganizationUpdateBillingProfile,
                K::OrganizationEmailLinkToBillingProfile,
                K::OrganizationEmailUnlinkFromBillingProfile,
                K::OrganizationLocationLinkToBillingProfile,
                K::OrganizationLocationUnlinkFromBillingProfile,
                K::OrganizationAddLocation,
            ],
            Arc::new(OrganizationEventHandler::new(ctx.clone())),
            best_effort,
        )
        .register(
            &[
                K::UserCreate,
                K::UserUpdate,
                K::UserPhoneNumberLink,
                K::UserJobRoleLink,
                K::UserAddRole,
                K::UserRemoveRole,
            ],
            Arc::new(UserEventHandler::new(ctx.clone())),
            best_effort,
        )
        .register(
            &[
                K::LocationCreate,
                K::LocationUpdate,
                K::LocationValidationFailed,
                K::LocationValidated,
            ],
            Arc::new(LocationEventHandler::new(ctx.clone())),
            best_effort,
        )
        .register(&[K::JobRoleCreate], Arc::new(JobRoleEventHandler::new(ctx.clone())), best_effort)
        .register(
            &[K::LogEntryCreate, K::LogEntryUpdate],
            Arc::new(LogEntryEventHandler::new(ctx.clone())),
            best_effort,
        )
        .register(
            &[K::CommentCreate, K::CommentUpdate],
            Arc::new(CommentEventHandler::new(ctx.clone())),
            best_effort,
        )
        .register(
            &[
                K::IssueCreate,
                K::IssueUpdate,
                K::IssueAddUserAssignee,
                K::IssueRemoveUserAssignee,
                K::IssueAddUserFollower,
                K::IssueRemoveUserFollower,
            ],
            Arc::new(IssueEventHandler::new(ctx.clone())),
            best_effort,
        )
        .register(
            &[
                K::OpportunityCreate,
                K::OpportunityUpdate,
                K::OpportunityUpdateNextCycleDate,
                K::OpportunityCreateRenewal,
                K::OpportunityUpdateRenewal,
                K::OpportunityCloseLost,
            ],
            Arc::new(OpportunityEventHandler::new(ctx.clone())),
            best_effort,
        )
        .register(
            &[
                K::ContractRolloutRenewalOpportunity,
                K::ContractDelete,
                K::ContractRefreshStatus,
                K::ContractRefreshLtv,
            ],
            Arc::new(ContractEventHandler::new(ctx.clone()).with_onboarding(onboarding_enabled)),
            best_effort,
        )
        .register(
            &[
                K::ServiceLineItemCreate,
                K::ServiceLineItemUpdate,
                K::ServiceLineItemDelete,
                K::ServiceLineItemClose,
                K::ServiceLineItemPause,
                K::ServiceLineItemResume,
            ],
            Arc::new(ServiceLineItemEventHandler::new(ctx.clone())),
            best_effort,
        )
        .register(
            &[
                K::InvoiceCreateForContract,
                K::InvoiceFill,
                K::InvoicePdfGenerated,
                K::InvoiceVoid,
                K::InvoiceDelete,
            ],
            Arc::new(InvoiceEventHandler::new(ctx.clone())),
            best_effort,
        )
        .register(
            &[K::TenantAddBillingProfile, K::TenantUpdateBillingProfile, K::TenantUpdateSettings],
            Arc::new(TenantEventHandler::new(ctx.clone())),
            best_effort,
        )
        .register(
            &[K::TenantAddBankAccount, K::TenantUpdateBankAccount, K::TenantDeleteBankAccount],
            Arc::new(BankAccountEventHandler::new(ctx.clone())),
            best_effort,
        )
        .register(
            &[K::ReminderCreate, K::ReminderUpdate],
            Arc::new(ReminderEventHandler::new(ctx.clone())),
            best_effort,
        )
        .ignore(GRAPH_IGNORED)
}

/// Routing table of the email validation subscriber.
///
/// With `park_failures` a failed validation is parked so it can be replayed;
/// otherwise it is logged and the delivery acknowledged.
#[must_use]
pub fn enrich_registry(
    ctx: &GraphContext,
    api: Arc<dyn EmailValidationApi>,
    park_failures: bool,
) -> HandlerRegistry {
    let policy = if park_failures { FailurePolicy::Parked } else { FailurePolicy::BestEffort };
    HandlerRegistry::new().register(
        &[EventKind::EmailValidate],
        Arc::new(EmailValidateHandler::new(ctx.clone(), api)),
        policy,
    )
}

/// Routing table of the organization subscriber.
///
/// Enrichment records its own failures on the organization, so it is best
/// effort. A market normalisation that cannot be sent is parked.
#[must_use]
pub fn organization_registry(ctx: &GraphContext, api: Arc<dyn EnrichmentApi>) -> HandlerRegistry {
    let handler = Arc::new(OrganizationEnrichmentHandler::new(ctx.clone(), api));
    HandlerRegistry::new()
        .register(
            &[EventKind::OrganizationRequestEnrich],
            handler.clone(),
            FailurePolicy::BestEffort,
        )
        .register(
            &[EventKind::OrganizationCreate, EventKind::OrganizationUpdate],
            handler,
            FailurePolicy::Parked,
        )
}

/// A named subscription group with its worker pool.
#[derive(Debug, Clone)]
pub struct Subscriber {
    name: &'static str,
    config: SubscriptionConfig,
    pool: WorkerPool,
}

impl Subscriber {
    /// Subscriber feeding `dispatcher` from `config.group_name`.
    #[must_use]
    pub fn new(
        name: &'static str,
        config: SubscriptionConfig,
        connector: Arc<dyn SubscriptionConnector>,
        dispatcher: EventDispatcher,
    ) -> Self {
        let pool = WorkerPool::new(config.pool_size, connector, Arc::new(dispatcher))
            .with_ack_mode(config.ack_mode);
        Self { name, config, pool }
    }

    /// Record parked deliveries in `log`.
    #[must_use]
    pub fn with_parked_log(mut self, log: Arc<dyn ParkedEventLog>) -> Self {
        self.pool = self.pool.with_parked_log(log);
        self
    }

    /// Subscriber name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Whether [`Subscriber::run`] does anything.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Run the worker pool until shutdown or the first worker failure.
    /// A disabled subscriber returns at once.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError`] when a worker fails.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<(), PoolError> {
        if !self.config.enabled {
            tracing::info!(subscriber = self.name, "Subscriber disabled");
            return Ok(());
        }
        tracing::info!(
            subscriber = self.name,
            group = %self.config.group_name,
            pool_size = self.config.pool_size,
            "Subscriber starting"
        );
        self.pool.connect(shutdown).await
    }
}

/// Graph projection subscriber.
#[must_use]
pub fn graph_subscriber(
    config: &ProjectionsConfig,
    ctx: &GraphContext,
    connector: Arc<dyn SubscriptionConnector>,
) -> Subscriber {
    let dispatcher = EventDispatcher::new(
        config.graph.group_name.clone(),
        graph_registry(ctx, config.onboarding_enabled),
    )
    .with_policy(DispatchPolicy::Reject)
    .with_event_timeout(config.event_timeout);
    Subscriber::new("graph", config.graph.clone(), connector, dispatcher)
}

/// Email validation subscriber.
#[must_use]
pub fn enrich_subscriber(
    config: &ProjectionsConfig,
    ctx: &GraphContext,
    connector: Arc<dyn SubscriptionConnector>,
    api: Arc<dyn EmailValidationApi>,
) -> Subscriber {
    let dispatcher = EventDispatcher::new(
        config.enrich.group_name.clone(),
        enrich_registry(ctx, api, config.park_failed_email_validations),
    )
    .with_policy(DispatchPolicy::AcceptListOnly)
    .with_event_timeout(config.event_timeout);
    Subscriber::new("enrich", config.enrich.clone(), connector, dispatcher)
}

/// Organization enrichment subscriber.
#[must_use]
pub fn organization_subscriber(
    config: &ProjectionsConfig,
    ctx: &GraphContext,
    connector: Arc<dyn SubscriptionConnector>,
    api: Arc<dyn EnrichmentApi>,
) -> Subscriber {
    let dispatcher = EventDispatcher::new(
        config.organization.group_name.clone(),
        organization_registry(ctx, api),
    )
    .with_policy(DispatchPolicy::AcceptListOnly)
    .with_event_timeout(config.event_timeout);
    Subscriber::new("organization", config.organization.clone(), connector, dispatcher)
}

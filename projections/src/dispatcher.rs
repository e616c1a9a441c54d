//! Event dispatch.
//!
//! [`EventDispatcher::when`] is the single entry point a worker calls for every
//! delivered event. It filters out what the subscriber does not care about,
//! continues the event's trace, bounds the handler by the event timeout and
//! applies the route's [`FailurePolicy`].
//!
//! ```text
//! event ──► internal? ──► Skipped
//!             │
//!             ▼
//!         ignored kind? ──► Ignored
//!             │
//!             ▼
//!         route? ──none──► Reject: InvalidEventType / AcceptListOnly: Ignored
//!             │
//!             ▼
//!         span + timeout(decode + handle)
//!             │
//!             ├─ Ok ──────────────────────► Projected
//!             └─ Err ─► BestEffort ───────► Swallowed
//!                       Parked ───────────► Err (worker parks)
//! ```

use crate::trace_context::event_span;
use crm_projections_core::event::StoredEvent;
use crm_projections_core::event_kind::EventKind;
use crm_projections_core::handler::{
    DecodedEvent, FailurePolicy, HandlerError, HandlerRegistry, Route,
};
use crm_projections_runtime::metrics::ProjectionMetrics;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::Instrument;

/// Default bound on a single event.
pub const DEFAULT_EVENT_TIMEOUT: Duration = Duration::from_secs(25);

/// What to do with an event type the registry has no route for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchPolicy {
    /// Unknown types are an error and get parked
    #[default]
    Reject,
    /// Only routed types matter; anything else is ignored
    AcceptListOnly,
}

/// Outcome of a successful dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    /// Event from an internal broker stream
    Skipped,
    /// Event type deliberately not handled
    Ignored,
    /// Handler applied the event
    Projected,
    /// Handler failed under a best-effort route
    Swallowed,
}

/// Dispatch failures. Any of these parks the delivery.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// No handler for the event type
    #[error("invalid event type: {event_type}")]
    InvalidEventType {
        /// Offending type string
        event_type: String,
    },

    /// The handler did not finish in time
    #[error("{event_type} timed out after {after:?}")]
    Timeout {
        /// Event type
        event_type: &'static str,
        /// Bound that was exceeded
        after: Duration,
    },

    /// The handler failed under a parked route
    #[error("{kind:?} handler failed: {source}")]
    Handler {
        /// Event kind
        kind: EventKind,
        /// Handler error
        #[source]
        source: HandlerError,
    },
}

/// Routes events of one subscription group to their handlers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    group: String,
    registry: HandlerRegistry,
    policy: DispatchPolicy,
    event_timeout: Duration,
}

impl EventDispatcher {
    /// Dispatcher for `group` over `registry`, rejecting unknown types.
    #[must_use]
    pub fn new(group: impl Into<String>, registry: HandlerRegistry) -> Self {
        Self {
            group: group.into(),
            registry,
            policy: DispatchPolicy::Reject,
            event_timeout: DEFAULT_EVENT_TIMEOUT,
        }
    }

    /// Set the policy for unrouted types.
    #[must_use]
    pub const fn with_policy(mut self, policy: DispatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the per-event bound.
    #[must_use]
    pub const fn with_event_timeout(mut self, event_timeout: Duration) -> Self {
        self.event_timeout = event_timeout;
        self
    }

    /// Subscription group name.
    #[must_use]
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Dispatch one event.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] when the delivery has to be parked: the type
    /// is unknown under [`DispatchPolicy::Reject`], or a [`FailurePolicy::Parked`]
    /// handler failed or timed out.
    pub async fn when(&self, event: &StoredEvent) -> Result<Handled, DispatchError> {
        if event.is_internal() {
            return Ok(Handled::Skipped);
        }

        let Ok(kind) = event.event_type.parse::<EventKind>() else {
            return self.unrouted(&event.event_type);
        };

        if self.registry.is_ignored(kind) {
            ProjectionMetrics::record_ignored(&self.group, kind.as_str());
            return Ok(Handled::Ignored);
        }

        let Some(route) = self.registry.route(kind) else {
            return self.unrouted(kind.as_str());
        };

        self.dispatch(event, kind, route).await
    }

    fn unrouted(&self, event_type: &str) -> Result<Handled, DispatchError> {
        match self.policy {
            DispatchPolicy::Reject => Err(DispatchError::InvalidEventType {
                event_type: event_type.to_string(),
            }),
            DispatchPolicy::AcceptListOnly => {
                ProjectionMetrics::record_ignored(&self.group, event_type);
                Ok(Handled::Ignored)
            }
        }
    }

    async fn dispatch(
        &self,
        event: &StoredEvent,
        kind: EventKind,
        route: &Route,
    ) -> Result<Handled, DispatchError> {
        let object_id = crm_projections_core::event::aggregate_object_id(
            &event.aggregate_id,
            &event.tenant(),
            kind.aggregate_type(),
        );
        let span = event_span(&self.group, event, kind, &object_id);
        let started = Instant::now();

        let handler = &route.handler;
        let work = async {
            let decoded = DecodedEvent::decode(event, kind)?;
            handler.handle(&decoded).await
        };

        let outcome = match tokio::time::timeout(self.event_timeout, work.instrument(span.clone()))
            .await
        {
            Ok(Ok(())) => {
                ProjectionMetrics::record_handled(&self.group, kind.as_str(), started.elapsed());
                return Ok(Handled::Projected);
            }
            Ok(Err(source)) => DispatchError::Handler { kind, source },
            Err(_) => DispatchError::Timeout {
                event_type: kind.as_str(),
                after: self.event_timeout,
            },
        };

        ProjectionMetrics::record_handler_error(&self.group, kind.as_str(), route.policy.as_str());
        match route.policy {
            FailurePolicy::BestEffort => {
                span.in_scope(|| {
                    tracing::warn!(
                        group = %self.group,
                        handler = handler.name(),
                        error = %outcome,
                        "Handler failed, continuing"
                    );
                });
                Ok(Handled::Swallowed)
            }
            FailurePolicy::Parked => {
                span.in_scope(|| {
                    tracing::error!(
                        group = %self.group,
                        handler = handler.name(),
                        error = %outcome,
                        "Handler failed"
                    );
                });
                Err(outcome)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crm_projections_core::handler::Handler;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
        fail: bool,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl Handler for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn handle(&self, _event: &DecodedEvent) -> Result<(), HandlerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(HandlerError::Other("boom".to_string()));
            }
            Ok(())
        }
    }

    fn event(aggregate_id: &str, event_type: &str) -> StoredEvent {
        StoredEvent::new(aggregate_id, event_type, &serde_json::json!({"tenant": "acme"})).unwrap()
    }

    fn dispatcher(handler: Arc<Counting>, policy: FailurePolicy) -> EventDispatcher {
        let registry = HandlerRegistry::new()
            .register(&[EventKind::ContractRefreshStatus], handler, policy)
            .ignore(&[EventKind::ContractUpdateStatus]);
        EventDispatcher::new("graph-v1", registry)
    }

    #[tokio::test]
    async fn internal_streams_are_skipped() {
        let handler = Arc::new(Counting::default());
        let dispatcher = dispatcher(Arc::clone(&handler), FailurePolicy::Parked);

        let outcome = dispatcher
            .when(&event("$stats-1", "V1_CONTRACT_REFRESH_STATUS"))
            .await
            .unwrap();

        assert_eq!(outcome, Handled::Skipped);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn ignored_kinds_do_not_reach_handlers() {
        let handler = Arc::new(Counting::default());
        let dispatcher = dispatcher(Arc::clone(&handler), FailurePolicy::Parked);

        let outcome = dispatcher
            .when(&event("contract-acme-c1", "V1_CONTRACT_UPDATE_STATUS"))
            .await
            .unwrap();

        assert_eq!(outcome, Handled::Ignored);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_type_is_rejected_with_its_name() {
        let dispatcher = dispatcher(Arc::new(Counting::default()), FailurePolicy::Parked);

        let err = dispatcher.when(&event("contract-acme-c1", "V9_NOT_A_THING")).await.unwrap_err();

        match err {
            DispatchError::InvalidEventType { event_type } => {
                assert_eq!(event_type, "V9_NOT_A_THING")
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn known_but_unrouted_type_is_rejected() {
        let dispatcher = dispatcher(Arc::new(Counting::default()), FailurePolicy::Parked);

        let err = dispatcher.when(&event("user-acme-u1", "V1_USER_CREATE")).await.unwrap_err();

        assert!(matches!(
            err,
            DispatchError::InvalidEventType { ref event_type } if event_type == "V1_USER_CREATE"
        ));
    }

    #[tokio::test]
    async fn accept_list_only_ignores_unrouted_types() {
        let dispatcher =
            dispatcher(Arc::new(Counting::default()), FailurePolicy::Parked)
                .with_policy(DispatchPolicy::AcceptListOnly);

        let outcome = dispatcher.when(&event("user-acme-u1", "V9_NOT_A_THING")).await.unwrap();

        assert_eq!(outcome, Handled::Ignored);
    }

    #[tokio::test]
    async fn routed_event_is_projected() {
        let handler = Arc::new(Counting::default());
        let dispatcher = dispatcher(Arc::clone(&handler), FailurePolicy::Parked);

        let outcome = dispatcher
            .when(&event("contract-acme-c1", "V1_CONTRACT_REFRESH_STATUS"))
            .await
            .unwrap();

        assert_eq!(outcome, Handled::Projected);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn best_effort_failure_is_swallowed() {
        let handler = Arc::new(Counting {
            fail: true,
            ..Counting::default()
        });
        let dispatcher = dispatcher(handler, FailurePolicy::BestEffort);

        let outcome = dispatcher
            .when(&event("contract-acme-c1", "V1_CONTRACT_REFRESH_STATUS"))
            .await
            .unwrap();

        assert_eq!(outcome, Handled::Swallowed);
    }

    #[tokio::test]
    async fn parked_failure_is_returned() {
        let handler = Arc::new(Counting {
            fail: true,
            ..Counting::default()
        });
        let dispatcher = dispatcher(handler, FailurePolicy::Parked);

        let err = dispatcher
            .when(&event("contract-acme-c1", "V1_CONTRACT_REFRESH_STATUS"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DispatchError::Handler { kind: EventKind::ContractRefreshStatus, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_handler_times_out() {
        let handler = Arc::new(Counting {
            delay: Some(Duration::from_secs(60)),
            ..Counting::default()
        });
        let dispatcher = dispatcher(handler, FailurePolicy::Parked);

        let err = dispatcher
            .when(&event("contract-acme-c1", "V1_CONTRACT_REFRESH_STATUS"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DispatchError::Timeout { after, .. } if after == DEFAULT_EVENT_TIMEOUT
        ));
    }
}

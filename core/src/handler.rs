//! Event handlers, failure policy and the handler registry.
//!
//! A subscriber owns one [`HandlerRegistry`]: a map from [`EventKind`] to the
//! handler that projects it, plus the set of kinds the subscriber ignores.
//! Each route declares a [`FailurePolicy`]; the dispatcher applies it, so a
//! handler only ever reports what went wrong.
//!
//! # Example
//!
//! ```ignore
//! let registry = HandlerRegistry::new()
//!     .register(
//!         &[EventKind::PhoneNumberCreate, EventKind::PhoneNumberUpdate],
//!         Arc::new(PhoneNumberEventHandler::new(graph)),
//!         FailurePolicy::BestEffort,
//!     )
//!     .ignore(&[EventKind::PhoneNumberValidate]);
//! ```

use crate::command::CommandError;
use crate::event::{aggregate_object_id, EventError, StoredEvent};
use crate::event_kind::EventKind;
use crate::events::EventPayload;
use crate::graph::GraphError;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

/// Handler failures.
#[derive(Error, Debug)]
pub enum HandlerError {
    /// Graph read or write failed
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Follow-up command failed
    #[error(transparent)]
    Command(#[from] CommandError),

    /// The payload could not be decoded
    #[error(transparent)]
    Decode(#[from] EventError),

    /// The handler was routed a payload it does not handle
    #[error("{handler} cannot handle payload {payload}")]
    UnexpectedPayload {
        /// Handler name
        handler: &'static str,
        /// Payload variant
        payload: &'static str,
    },

    /// A node the handler depends on is missing
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity label
        entity: &'static str,
        /// Entity id
        id: String,
    },

    /// Any other failure
    #[error("{0}")]
    Other(String),
}

impl HandlerError {
    /// Shorthand for [`HandlerError::UnexpectedPayload`].
    #[must_use]
    pub const fn unexpected(handler: &'static str, payload: &EventPayload) -> Self {
        Self::UnexpectedPayload {
            handler,
            payload: payload.name(),
        }
    }
}

/// An event decoded once for every handler.
#[derive(Debug, Clone)]
pub struct DecodedEvent {
    /// Kind
    pub kind: EventKind,
    /// Tenant named in the payload
    pub tenant: String,
    /// Graph id of the aggregate
    pub object_id: String,
    /// Typed payload
    pub payload: EventPayload,
    /// Original envelope
    pub event: StoredEvent,
}

impl DecodedEvent {
    /// Decode the envelope's payload as `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Decode`] if the payload does not match the kind.
    pub fn decode(event: &StoredEvent, kind: EventKind) -> Result<Self, EventError> {
        let payload = EventPayload::decode(kind, &event.data)?;
        let tenant = event.tenant();
        let object_id = aggregate_object_id(&event.aggregate_id, &tenant, kind.aggregate_type());
        Ok(Self {
            kind,
            tenant,
            object_id,
            payload,
            event: event.clone(),
        })
    }
}

/// Projects events of one or more kinds.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Name used in logs and spans.
    fn name(&self) -> &'static str;

    /// Apply the event.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] on failure; the route's policy decides what
    /// happens to the delivery.
    async fn handle(&self, event: &DecodedEvent) -> Result<(), HandlerError>;
}

/// What a handler failure does to the delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailurePolicy {
    /// The error reaches the worker, which parks the message
    Parked,
    /// The error is logged and the message is treated as handled
    BestEffort,
}

impl FailurePolicy {
    /// Label for metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Parked => "parked",
            Self::BestEffort => "best_effort",
        }
    }
}

/// A registered handler and its policy.
#[derive(Clone)]
pub struct Route {
    /// Handler
    pub handler: Arc<dyn Handler>,
    /// Failure policy
    pub policy: FailurePolicy,
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("handler", &self.handler.name())
            .field("policy", &self.policy)
            .finish()
    }
}

/// Routes and ignore set of one subscriber.
#[derive(Debug, Clone, Default)]
pub struct HandlerRegistry {
    routes: HashMap<EventKind, Route>,
    ignored: HashSet<EventKind>,
}

impl HandlerRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Route `kinds` to `handler`. A later registration for the same kind wins.
    #[must_use]
    pub fn register(
        mut self,
        kinds: &[EventKind],
        handler: Arc<dyn Handler>,
        policy: FailurePolicy,
    ) -> Self {
        for kind in kinds {
            self.ignored.remove(kind);
            self.routes.insert(
                *kind,
                Route {
                    handler: Arc::clone(&handler),
                    policy,
                },
            );
        }
        self
    }

    /// Mark `kinds` as deliberately ignored.
    #[must_use]
    pub fn ignore(mut self, kinds: &[EventKind]) -> Self {
        for kind in kinds {
            if !self.routes.contains_key(kind) {
                self.ignored.insert(*kind);
            }
        }
        self
    }

    /// Route for `kind`.
    #[must_use]
    pub fn route(&self, kind: EventKind) -> Option<&Route> {
        self.routes.get(&kind)
    }

    /// Whether `kind` is ignored.
    #[must_use]
    pub fn is_ignored(&self, kind: EventKind) -> bool {
        self.ignored.contains(&kind)
    }

    /// Every routed kind.
    pub fn routed_kinds(&self) -> impl Iterator<Item = EventKind> + '_ {
        self.routes.keys().copied()
    }

    /// Number of routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether nothing is routed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

//! # CRM Projections Core
//!
//! Types and ports shared by every part of the projection pipeline.
//!
//! Domain events are appended by the command side, delivered at least once by
//! a persistent subscription, decoded into a typed [`events::EventPayload`]
//! and applied to the tenant-scoped property graph by a [`handler::Handler`].
//!
//! ## Modules
//!
//! - [`event`]: stored event envelope and aggregate object id resolution
//! - [`event_kind`]: closed set of event type strings
//! - [`events`]: payload structs per aggregate family
//! - [`handler`]: handler trait, failure policy and registry
//! - [`graph`]: graph repository port and property model
//! - [`command`]: follow-up commands sent back to the command side
//! - [`notifier`]: event-completed notifications
//! - [`subscription`]: persistent subscription port
//! - [`model`]: read-model entities decoded from graph nodes
//! - [`contract`]: contract status derivation and lifetime value
//! - [`sync`]: per-item sync outcomes
//!
//! ## Flow
//!
//! ```text
//! broker ──► PersistentSubscription ──► dispatcher ──► Handler ──► GraphRepository
//!                    ▲                                    │
//!                    └──────── ack / park ◄───────────────┤
//!                                                         ├──► CommandClient
//!                                                         └──► EventCompletedNotifier
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

pub mod command;
pub mod contract;
pub mod event;
pub mod event_kind;
pub mod events;
pub mod graph;
pub mod handler;
pub mod model;
pub mod notifier;
pub mod subscription;
pub mod sync;

/// Environment module - injected dependencies that are not ports of their own.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// Contract status derivation and lifetime value both depend on "now";
    /// handlers take a clock so tests can pin it.
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall clock.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

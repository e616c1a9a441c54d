//! Event subscribers of the CRM read model.
//!
//! # Overview
//!
//! Three persistent subscriptions consume the tenant event stream:
//!
//! - **graph**: projects every aggregate family into the property graph
//!   through the handlers in [`graph`]
//! - **enrich**: validates email addresses ([`enrich`])
//! - **organization**: enriches organizations by domain and normalises new
//!   ones ([`organization`])
//!
//! Each subscription runs a [`WorkerPool`] of connections. Every delivery goes
//! through [`EventDispatcher::when`], which routes by event kind, bounds the
//! handler by the event timeout and decides whether a failure parks the event.
//! Handlers announce finished work with `EventCompleted` signals and ask other
//! aggregates to recompute through follow-up commands.
//!
//! ```text
//! broker ──► WorkerPool ──► EventDispatcher ──► Handler ──► GraphRepository
//!               │                                  │
//!               └── park + ack on failure          └──► CommandClient / notifier
//! ```
//!
//! [`log_entry_sync`] imports log entries in batches from external systems
//! and records one status per entry.

pub mod api;
pub mod config;
pub mod dispatcher;
pub mod enrich;
pub mod graph;
pub mod log_entry_sync;
pub mod organization;
pub mod pool;
pub mod subscriber;
pub mod trace_context;

pub use api::{ApiClient, EnrichmentError};
pub use config::{
    AckMode, ApiConfig, ConfigError, KafkaConfig, Neo4jConfig, ProjectionsConfig,
    SubscriptionConfig,
};
pub use dispatcher::{DispatchError, DispatchPolicy, EventDispatcher, Handled};
pub use graph::GraphContext;
pub use log_entry_sync::LogEntrySyncService;
pub use pool::{PoolError, WorkerPool};
pub use subscriber::{Subscriber, enrich_subscriber, graph_subscriber, organization_subscriber};

//! # CRM Projections Runtime
//!
//! Cross-cutting helpers used by the subscribers and handlers:
//!
//! - [`retry`]: exponential backoff and the `await_condition` polling primitive
//! - [`command`]: a [`CommandClient`](crm_projections_core::command::CommandClient)
//!   decorator that retries transient failures
//! - [`metrics`]: projection counters and the Prometheus exporter

pub mod command;
pub mod metrics;
pub mod retry;

pub use command::RetryingCommandClient;
pub use retry::{AwaitError, RetryPolicy, await_condition, retry_with_backoff, retry_with_predicate};

//! Prometheus metrics for the projection pipeline.
//!
//! Counters are labelled by subscription `group`, `event_type` and, where it
//! applies, failure `policy`:
//!
//! - `projections.events.received`
//! - `projections.events.handled`
//! - `projections.events.ignored`
//! - `projections.events.parked`
//! - `projections.handler_errors`
//! - `projections.event.duration_seconds` (histogram)
//!
//! # Example
//!
//! ```rust,no_run
//! use crm_projections_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub use metrics::{counter, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus scrape endpoint.
pub struct MetricsServer {
    addr: SocketAddr,
    started: bool,
}

impl MetricsServer {
    /// Create a server that will listen on `addr`.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, started: false }
    }

    /// Install the recorder and start the HTTP listener.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let builder = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 25.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install() {
            Ok(()) => {
                self.started = true;
                tracing::info!(
                    addr = %self.addr,
                    "Metrics available at http://{}/metrics",
                    self.addr
                );
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already initialized") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Whether this server installed the recorder.
    #[must_use]
    pub const fn is_started(&self) -> bool {
        self.started
    }
}

fn register_metrics() {
    describe_counter!("projections.events.received", "Deliveries received from a subscription");
    describe_counter!("projections.events.handled", "Events applied by a handler");
    describe_counter!(
        "projections.events.ignored",
        "Events skipped by the ignore set or accept list"
    );
    describe_counter!("projections.events.parked", "Deliveries parked for manual replay");
    describe_counter!("projections.handler_errors", "Handler failures, by failure policy");
    describe_histogram!("projections.event.duration_seconds", "Time spent dispatching one event");

    describe_counter!("retry_attempts_total", "Total number of retry attempts");
    describe_counter!("retry_successes_total", "Total number of successful retries");
    describe_counter!("retry_exhausted_total", "Operations that exhausted their retries");
}

/// Projection metrics recorder.
pub struct ProjectionMetrics;

impl ProjectionMetrics {
    /// A delivery arrived.
    pub fn record_received(group: &str) {
        counter!("projections.events.received", "group" => group.to_string()).increment(1);
    }

    /// A handler applied the event.
    pub fn record_handled(group: &str, event_type: &str, duration: Duration) {
        counter!(
            "projections.events.handled",
            "group" => group.to_string(),
            "event_type" => event_type.to_string()
        )
        .increment(1);
        histogram!("projections.event.duration_seconds", "group" => group.to_string())
            .record(duration.as_secs_f64());
    }

    /// The event was ignored.
    pub fn record_ignored(group: &str, event_type: &str) {
        counter!(
            "projections.events.ignored",
            "group" => group.to_string(),
            "event_type" => event_type.to_string()
        )
        .increment(1);
    }

    /// The delivery was parked.
    pub fn record_parked(group: &str, event_type: &str) {
        counter!(
            "projections.events.parked",
            "group" => group.to_string(),
            "event_type" => event_type.to_string()
        )
        .increment(1);
    }

    /// A handler failed under `policy`.
    pub fn record_handler_error(group: &str, event_type: &str, policy: &'static str) {
        counter!(
            "projections.handler_errors",
            "group" => group.to_string(),
            "event_type" => event_type.to_string(),
            "policy" => policy
        )
        .increment(1);
    }
}

/// Retry metrics recorder.
pub struct RetryMetrics;

impl RetryMetrics {
    /// Record a retry attempt.
    pub fn record_attempt() {
        counter!("retry_attempts_total").increment(1);
    }

    /// Record a successful retry.
    pub fn record_success() {
        counter!("retry_successes_total").increment(1);
    }

    /// Record exhausted retries.
    pub fn record_exhausted() {
        counter!("retry_exhausted_total").increment(1);
    }
}

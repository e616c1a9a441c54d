//! Redpanda adapters for the CRM projections.
//!
//! Everything here speaks the Kafka protocol through `rdkafka`, so any
//! Kafka-compatible broker works (Redpanda, Apache Kafka, MSK).
//!
//! # Mapping
//!
//! ```text
//! subscription group   ──► consumer group
//! worker connection    ──► one consumer in the group
//! ack                  ──► commit offset + 1
//! park                 ──► publish to {topic}{parked_suffix} with a park-reason header
//! command              ──► JSON record on the commands topic, keyed by aggregate
//! EventCompleted       ──► JSON record on the completion topic, keyed by entity
//! ```
//!
//! # Delivery semantics
//!
//! **At-least-once**: auto-commit is off and an offset is committed only when
//! the worker acknowledges the delivery. A crash before the ack redelivers the
//! message, so handlers must be idempotent. Order holds within a partition;
//! events are keyed by aggregate id upstream.
//!
//! # Example
//!
//! ```no_run
//! use crm_projections_redpanda::KafkaConnector;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let connector = KafkaConnector::builder()
//!     .brokers("localhost:9092")
//!     .topic("events")
//!     .auto_offset_reset("earliest")
//!     .build()?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod commands;
mod notifier;
mod subscription;

pub use commands::KafkaCommandClient;
pub use notifier::KafkaNotifier;
pub use subscription::{
    KafkaConnector, KafkaConnectorBuilder, KafkaSubscription, PARK_GROUP_HEADER, PARK_REASON_HEADER,
};

use rdkafka::config::ClientConfig;
use rdkafka::producer::FutureProducer;
use std::time::Duration;
use thiserror::Error;

/// Default producer send timeout.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors building broker clients.
#[derive(Error, Debug, Clone)]
pub enum BrokerError {
    /// A required setting is missing
    #[error("{0} not configured")]
    NotConfigured(&'static str),

    /// The client could not be created
    #[error("Failed to create Kafka client: {0}")]
    Client(String),
}

/// Producer with acks from every in-sync replica.
///
/// # Errors
///
/// Returns [`BrokerError::Client`] if the configuration is rejected.
pub fn producer(brokers: &str, timeout: Duration) -> Result<FutureProducer, BrokerError> {
    ClientConfig::new()
        .set("bootstrap.servers", brokers)
        .set("message.timeout.ms", timeout.as_millis().to_string())
        .set("acks", "all")
        .set("enable.idempotence", "true")
        .create()
        .map_err(|e| BrokerError::Client(format!("producer: {e}")))
}

//! Completion signals published for downstream consumers.

use crate::{BrokerError, DEFAULT_SEND_TIMEOUT, producer};
use async_trait::async_trait;
use crm_projections_core::notifier::{EventCompleted, EventCompletedNotifier, NotifyError};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;

/// [`EventCompletedNotifier`] writing JSON signals to a topic, keyed
/// `{tenant}-{entity id}`.
#[derive(Clone)]
pub struct KafkaNotifier {
    producer: FutureProducer,
    topic: String,
    timeout: Duration,
}

impl std::fmt::Debug for KafkaNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaNotifier").field("topic", &self.topic).finish_non_exhaustive()
    }
}

impl KafkaNotifier {
    /// Notifier publishing to `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Client`] if the producer cannot be created.
    pub fn new(brokers: &str, topic: impl Into<String>) -> Result<Self, BrokerError> {
        Ok(Self {
            producer: producer(brokers, DEFAULT_SEND_TIMEOUT)?,
            topic: topic.into(),
            timeout: DEFAULT_SEND_TIMEOUT,
        })
    }
}

#[async_trait]
impl EventCompletedNotifier for KafkaNotifier {
    async fn notify(&self, completed: EventCompleted) -> Result<(), NotifyError> {
        let payload = serde_json::to_vec(&completed).map_err(|e| NotifyError(e.to_string()))?;
        let key = format!("{}-{}", completed.tenant, completed.entity_id);
        let record = FutureRecord::to(&self.topic).payload(&payload).key(&key);
        self.producer
            .send(record, Timeout::After(self.timeout))
            .await
            .map_err(|(e, _)| NotifyError(e.to_string()))?;
        tracing::trace!(topic = %self.topic, key, "Completion published");
        Ok(())
    }
}

//! Persistent subscriptions over Kafka consumer groups.

use crate::{BrokerError, DEFAULT_SEND_TIMEOUT, producer};
use crm_projections_core::event::StoredEvent;
use crm_projections_core::subscription::{
    ConnectFuture, Delivery, PersistentSubscription, Receipt, SubscriptionConnector,
    SubscriptionError, SubscriptionMessage,
};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Header, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Header carrying the error that parked a message.
pub const PARK_REASON_HEADER: &str = "park-reason";

/// Header carrying the group that parked a message.
pub const PARK_GROUP_HEADER: &str = "park-group";

/// Consecutive receive errors after which the connection counts as dropped.
const MAX_CONSECUTIVE_ERRORS: u32 = 5;

/// Opens Kafka consumers for subscription groups.
///
/// Every connection is its own consumer in the group, so the broker spreads
/// partitions across the pool's workers.
#[derive(Clone)]
pub struct KafkaConnector {
    brokers: String,
    topic: String,
    parked_topic: String,
    auto_offset_reset: String,
    timeout: Duration,
    producer: FutureProducer,
}

impl std::fmt::Debug for KafkaConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaConnector")
            .field("brokers", &self.brokers)
            .field("topic", &self.topic)
            .field("parked_topic", &self.parked_topic)
            .finish_non_exhaustive()
    }
}

impl KafkaConnector {
    /// Builder with defaults: parked suffix `-parked`, offset reset `earliest`.
    #[must_use]
    pub fn builder() -> KafkaConnectorBuilder {
        KafkaConnectorBuilder::default()
    }

    /// Topic parked messages go to.
    #[must_use]
    pub fn parked_topic(&self) -> &str {
        &self.parked_topic
    }

    fn consumer(&self, group: &str, worker_id: usize) -> Result<StreamConsumer, SubscriptionError> {
        let connect_error = |reason: String| SubscriptionError::Connect {
            group: group.to_string(),
            reason,
        };
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", group)
            .set("client.id", format!("{group}-{worker_id}"))
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", &self.auto_offset_reset)
            .set("session.timeout.ms", "6000")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| connect_error(format!("Failed to create consumer: {e}")))?;
        consumer
            .subscribe(&[self.topic.as_str()])
            .map_err(|e| connect_error(format!("Failed to subscribe to {}: {e}", self.topic)))?;
        Ok(consumer)
    }
}

impl SubscriptionConnector for KafkaConnector {
    fn connect<'a>(
        &'a self,
        group: &'a str,
        worker_id: usize,
    ) -> ConnectFuture<'a> {
        Box::pin(async move {
            let consumer = self.consumer(group, worker_id)?;
            tracing::info!(
                topic = %self.topic,
                group,
                worker = worker_id,
                auto_offset_reset = %self.auto_offset_reset,
                "Joined subscription group"
            );
            Ok(Box::new(KafkaSubscription {
                consumer,
                producer: self.producer.clone(),
                group: group.to_string(),
                parked_topic: self.parked_topic.clone(),
                timeout: self.timeout,
            }) as Box<dyn PersistentSubscription>)
        })
    }
}

/// Builder for a [`KafkaConnector`].
#[derive(Debug, Default)]
pub struct KafkaConnectorBuilder {
    brokers: Option<String>,
    topic: Option<String>,
    parked_suffix: Option<String>,
    auto_offset_reset: Option<String>,
    timeout: Option<Duration>,
}

impl KafkaConnectorBuilder {
    /// Comma-separated broker addresses.
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Topic carrying domain events.
    #[must_use]
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Suffix forming the parked topic name. Default: `-parked`.
    #[must_use]
    pub fn parked_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.parked_suffix = Some(suffix.into());
        self
    }

    /// Where new groups start reading: `earliest` (default) or `latest`.
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Send timeout for parked messages. Default: 5 seconds.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the connector.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::NotConfigured`] if brokers or topic are unset,
    /// [`BrokerError::Client`] if the parking producer cannot be created.
    pub fn build(self) -> Result<KafkaConnector, BrokerError> {
        let brokers = self
            .brokers
            .filter(|b| !b.is_empty())
            .ok_or(BrokerError::NotConfigured("brokers"))?;
        let topic = self
            .topic
            .filter(|t| !t.is_empty())
            .ok_or(BrokerError::NotConfigured("topic"))?;
        let parked_topic = format!("{topic}{}", self.parked_suffix.as_deref().unwrap_or("-parked"));
        let timeout = self.timeout.unwrap_or(DEFAULT_SEND_TIMEOUT);
        let producer = producer(&brokers, timeout)?;

        Ok(KafkaConnector {
            brokers,
            topic,
            parked_topic,
            auto_offset_reset: self.auto_offset_reset.unwrap_or_else(|| "earliest".to_string()),
            timeout,
            producer,
        })
    }
}

/// One consumer in a subscription group.
pub struct KafkaSubscription {
    consumer: StreamConsumer,
    producer: FutureProducer,
    group: String,
    parked_topic: String,
    timeout: Duration,
}

impl std::fmt::Debug for KafkaSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaSubscription")
            .field("group", &self.group)
            .field("parked_topic", &self.parked_topic)
            .finish_non_exhaustive()
    }
}

/// Envelope carried by a message, if it decodes.
pub(crate) fn decode_event(payload: &[u8]) -> Option<StoredEvent> {
    if payload.is_empty() {
        return None;
    }
    match serde_json::from_slice(payload) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::warn!(error = %e, "Message does not carry an event envelope");
            None
        }
    }
}

fn delivery(message: &BorrowedMessage<'_>) -> Delivery {
    let payload = message.payload().map(<[u8]>::to_vec).unwrap_or_default();
    Delivery {
        receipt: Receipt {
            stream: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
        },
        event: decode_event(&payload),
        payload,
    }
}

impl PersistentSubscription for KafkaSubscription {
    fn recv(&self) -> Pin<Box<dyn Future<Output = SubscriptionMessage> + Send + '_>> {
        Box::pin(async move {
            let mut errors = 0;
            loop {
                match self.consumer.recv().await {
                    Ok(message) => return SubscriptionMessage::EventAppeared(delivery(&message)),
                    Err(e) => {
                        errors += 1;
                        if errors >= MAX_CONSECUTIVE_ERRORS {
                            return SubscriptionMessage::Dropped { reason: e.to_string() };
                        }
                        tracing::warn!(
                            group = %self.group,
                            error = %e,
                            attempt = errors,
                            "Receive failed"
                        );
                        tokio::time::sleep(Duration::from_millis(200 * u64::from(errors))).await;
                    }
                }
            }
        })
    }

    fn ack<'a>(
        &'a self,
        delivery: &'a Delivery,
    ) -> Pin<Box<dyn Future<Output = Result<(), SubscriptionError>> + Send + 'a>> {
        Box::pin(async move {
            let receipt = &delivery.receipt;
            let mut offsets = TopicPartitionList::new();
            offsets
                .add_partition_offset(
                    &receipt.stream,
                    receipt.partition,
                    Offset::Offset(receipt.offset + 1),
                )
                .map_err(|e| SubscriptionError::Ack(e.to_string()))?;
            self.consumer
                .commit(&offsets, CommitMode::Async)
                .map_err(|e| SubscriptionError::Ack(e.to_string()))?;
            tracing::trace!(
                group = %self.group,
                partition = receipt.partition,
                offset = receipt.offset,
                "Offset committed"
            );
            Ok(())
        })
    }

    fn park<'a>(
        &'a self,
        delivery: &'a Delivery,
        reason: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), SubscriptionError>> + Send + 'a>> {
        Box::pin(async move {
            let headers = OwnedHeaders::new()
                .insert(Header {
                    key: PARK_REASON_HEADER,
                    value: Some(reason),
                })
                .insert(Header {
                    key: PARK_GROUP_HEADER,
                    value: Some(self.group.as_str()),
                });
            let key = delivery.event.as_ref().map_or("", |e| e.aggregate_id.as_str());
            let record = FutureRecord::to(&self.parked_topic)
                .payload(&delivery.payload)
                .key(key)
                .headers(headers);

            self.producer
                .send(record, Timeout::After(self.timeout))
                .await
                .map_err(|(e, _)| SubscriptionError::Park(e.to_string()))?;
            tracing::warn!(
                group = %self.group,
                parked_topic = %self.parked_topic,
                offset = delivery.receipt.offset,
                reason,
                "Message parked"
            );
            Ok(())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn builder_requires_brokers_and_topic() {
        let err = KafkaConnector::builder().topic("events").build().unwrap_err();
        assert!(matches!(err, BrokerError::NotConfigured("brokers")));

        let err = KafkaConnector::builder().brokers("localhost:9092").build().unwrap_err();
        assert!(matches!(err, BrokerError::NotConfigured("topic")));
    }

    #[test]
    fn parked_topic_appends_the_suffix() {
        let connector = KafkaConnector::builder()
            .brokers("localhost:9092")
            .topic("events")
            .build()
            .unwrap();
        assert_eq!(connector.parked_topic(), "events-parked");

        let connector = KafkaConnector::builder()
            .brokers("localhost:9092")
            .topic("events")
            .parked_suffix(".dlq")
            .build()
            .unwrap();
        assert_eq!(connector.parked_topic(), "events.dlq");
    }

    #[test]
    fn envelopes_decode_and_garbage_does_not() {
        let event = StoredEvent::new(
            "contact-acme-c1",
            "V1_CONTACT_CREATE",
            &serde_json::json!({"tenant": "acme"}),
        )
        .unwrap();
        let payload = serde_json::to_vec(&event).unwrap();

        assert_eq!(decode_event(&payload), Some(event));
        assert_eq!(decode_event(b"not json"), None);
        assert_eq!(decode_event(b""), None);
    }
}

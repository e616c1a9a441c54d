//! Commands published to the command side's topic.

use crate::{BrokerError, DEFAULT_SEND_TIMEOUT, producer};
use async_trait::async_trait;
use crm_projections_core::command::{Command, CommandAck, CommandClient, CommandError};
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use uuid::Uuid;

/// [`CommandClient`] writing JSON commands to a topic.
///
/// Records are keyed `{tenant}-{target id}` so commands for one aggregate
/// stay ordered. A command that creates its aggregate gets a fresh id here,
/// and that id is returned in the ack.
#[derive(Clone)]
pub struct KafkaCommandClient {
    producer: FutureProducer,
    topic: String,
    timeout: Duration,
}

impl std::fmt::Debug for KafkaCommandClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaCommandClient").field("topic", &self.topic).finish_non_exhaustive()
    }
}

impl KafkaCommandClient {
    /// Client publishing to `topic`.
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

/// Give a creating command its aggregate id.
fn assign_id(mut command: Command) -> Command {
    if let Command::UpsertLogEntry { log_entry_id, .. } = &mut command {
        if log_entry_id.is_empty() {
            *log_entry_id = Uuid::new_v4().to_string();
        }
    }
    command
}

fn record_key(command: &Command) -> String {
    format!("{}-{}", command.tenant(), command.target_id())
}

#[async_trait]
impl CommandClient for KafkaCommandClient {
    async fn send(&self, command: &Command) -> Result<CommandAck, CommandError> {
        command.validate()?;
        let command = assign_id(command.clone());
        let payload = serde_json::to_vec(&command)
            .map_err(|e| CommandError::Serialization(e.to_string()))?;
        let key = record_key(&command);
        let headers = OwnedHeaders::new()
            .insert(Header {
                key: "command-type",
                value: Some(command.name()),
            })
            .insert(Header {
                key: "tenant",
                value: Some(command.tenant()),
            });
        let record = FutureRecord::to(&self.topic).payload(&payload).key(&key).headers(headers);

        match self.producer.send(record, Timeout::After(self.timeout)).await {
            Ok((partition, offset)) => {
                tracing::debug!(
                    topic = %self.topic,
                    command = command.name(),
                    tenant = command.tenant(),
                    partition,
                    offset,
                    "Command published"
                );
                Ok(CommandAck {
                    id: command.target_id().to_string(),
                })
            }
            Err((e, _)) => {
                tracing::error!(
                    topic = %self.topic,
                    command = command.name(),
                    error = %e,
                    "Failed to publish command"
                );
                Err(CommandError::Unavailable(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crm_projections_core::events::{ExternalSystem, Source};

    fn upsert(log_entry_id: &str) -> Command {
        Command::UpsertLogEntry {
            tenant: "acme".into(),
            log_entry_id: log_entry_id.into(),
            content: "note".into(),
            content_type: "text/plain".into(),
            started_at: None,
            author_user_id: String::new(),
            logged_organization_ids: Vec::new(),
            source: Source::default(),
            external_system: ExternalSystem::default(),
        }
    }

    #[test]
    fn new_log_entries_get_an_id() {
        let command = assign_id(upsert(""));
        assert!(Uuid::parse_str(command.target_id()).is_ok());

        let command = assign_id(upsert("le-1"));
        assert_eq!(command.target_id(), "le-1");
    }

    #[test]
    fn records_are_keyed_by_tenant_and_aggregate() {
        let command = Command::CloseWonOpportunity {
            tenant: "acme".into(),
            opportunity_id: "op1".into(),
            app_source: String::new(),
        };
        assert_eq!(record_key(&command), "acme-op1");
    }
}

//! Subscriber configuration.
//!
//! Loaded from environment variables with defaults. Required values and
//! malformed numbers are reported as [`ConfigError`] instead of panicking.

use crm_projections_runtime::RetryPolicy;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is missing or empty.
    #[error("Environment variable {0} is not set")]
    EnvVarNotSet(&'static str),

    /// A variable is set but cannot be used.
    #[error("Invalid value for {var}: {reason}")]
    Invalid {
        /// Variable name
        var: String,
        /// What is wrong with it
        reason: String,
    },
}

/// Neo4j connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Neo4jConfig {
    /// Bolt URI
    pub uri: String,
    /// User name
    pub user: String,
    /// Password
    pub password: String,
    /// Connection pool size
    pub max_connections: usize,
}

/// Kafka / Redpanda settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KafkaConfig {
    /// Broker addresses (comma-separated)
    pub brokers: String,
    /// Topic carrying domain events
    pub events_topic: String,
    /// Suffix appended to a topic name to form its parked topic
    pub parked_suffix: String,
    /// Topic commands are published to
    pub commands_topic: String,
    /// Topic event-completed signals are published to
    pub completion_topic: String,
    /// `auto.offset.reset` for new consumer groups
    pub offset_reset: String,
}

/// Ack behaviour after a park.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckMode {
    /// Park, then acknowledge the same delivery.
    #[default]
    AckAfterPark,
    /// Park only; the broker treats the parked message as settled.
    ParkOnly,
}

/// One persistent subscription group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionConfig {
    /// Group name shared by every worker
    pub group_name: String,
    /// Concurrent connections to the group
    pub pool_size: usize,
    /// Whether the subscriber runs at all
    pub enabled: bool,
    /// Ack behaviour after a park
    pub ack_mode: AckMode,
}

/// An authenticated HTTP API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    /// Base URL
    pub url: String,
    /// Value of the API key header
    pub api_key: String,
}

/// Full subscriber configuration.
#[derive(Debug, Clone)]
pub struct ProjectionsConfig {
    /// Graph store
    pub neo4j: Neo4jConfig,
    /// Broker
    pub kafka: KafkaConfig,
    /// Parked-event ledger and sync runs; disabled when unset
    pub postgres_url: Option<String>,
    /// Graph projection subscriber
    pub graph: SubscriptionConfig,
    /// Email validation subscriber
    pub enrich: SubscriptionConfig,
    /// Organization enrichment subscriber
    pub organization: SubscriptionConfig,
    /// Organization enrichment API
    pub enrichment_api: ApiConfig,
    /// Email validation API
    pub email_validation_api: ApiConfig,
    /// Retry policy for follow-up commands
    pub retry: RetryPolicy,
    /// Max evaluations when waiting for the read model to catch up
    pub await_visibility_attempts: usize,
    /// Deadline for handling one event
    pub event_timeout: Duration,
    /// Max log entries synced concurrently
    pub log_entry_sync_concurrency: usize,
    /// Start onboarding when a contract goes live
    pub onboarding_enabled: bool,
    /// Park email validations that fail instead of dropping them
    pub park_failed_email_validations: bool,
    /// `app_source` stamped on commands and timeline actions
    pub app_source: String,
    /// Prometheus exporter address
    pub metrics_addr: Option<String>,
}

impl ProjectionsConfig {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `NEO4J_PASSWORD` is unset or a numeric or
    /// boolean variable does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`.
    ///
    /// # Errors
    ///
    /// Same as [`ProjectionsConfig::from_env`].
    #[allow(clippy::too_many_lines)]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let vars = Vars(&lookup);

        let retry = RetryPolicy::builder()
            .max_retries(vars.parse("RETRY_MAX_RETRIES", 3)?)
            .initial_delay(Duration::from_millis(vars.parse("RETRY_INITIAL_DELAY_MS", 100)?))
            .max_delay(Duration::from_millis(vars.parse("RETRY_MAX_DELAY_MS", 5_000)?))
            .multiplier(vars.parse("RETRY_MULTIPLIER", 2.0)?)
            .build();

        let config = Self {
            neo4j: Neo4jConfig {
                uri: vars.string("NEO4J_URI", "bolt://localhost:7687"),
                user: vars.string("NEO4J_USER", "neo4j"),
                password: vars.required("NEO4J_PASSWORD")?,
                max_connections: vars.parse("NEO4J_MAX_CONNECTIONS", 16)?,
            },
            kafka: KafkaConfig {
                brokers: vars.string("KAFKA_BROKERS", "localhost:9092"),
                events_topic: vars.string("EVENTS_TOPIC", "crm-events"),
                parked_suffix: vars.string("PARKED_TOPIC_SUFFIX", ".parked"),
                commands_topic: vars.string("COMMANDS_TOPIC", "crm-commands"),
                completion_topic: vars.string("EVENT_COMPLETED_TOPIC", "crm-event-completed"),
                offset_reset: vars.string("KAFKA_OFFSET_RESET", "earliest"),
            },
            postgres_url: vars.optional("DATABASE_URL"),
            graph: vars.subscription("GRAPH", "graph-v1", 4)?,
            enrich: vars.subscription("ENRICH", "enrich-v1", 2)?,
            organization: vars.subscription("ORGANIZATION", "organization-v1", 2)?,
            enrichment_api: ApiConfig {
                url: vars.string("ENRICHMENT_API_URL", "http://localhost:10010"),
                api_key: vars.string("ENRICHMENT_API_KEY", ""),
            },
            email_validation_api: ApiConfig {
                url: vars.string("EMAIL_VALIDATION_API_URL", "http://localhost:10020"),
                api_key: vars.string("EMAIL_VALIDATION_API_KEY", ""),
            },
            retry,
            await_visibility_attempts: vars.parse("AWAIT_VISIBILITY_MAX_ATTEMPTS", 6)?,
            event_timeout: Duration::from_secs(vars.parse("EVENT_TIMEOUT_SECS", 25)?),
            log_entry_sync_concurrency: vars.parse("LOG_ENTRY_SYNC_CONCURRENCY", 4)?,
            onboarding_enabled: vars.parse("ONBOARDING_ENABLED", false)?,
            park_failed_email_validations: vars.parse("PARK_FAILED_EMAIL_VALIDATIONS", true)?,
            app_source: vars.string("APP_SOURCE", "event-processing-platform-subscribers"),
            metrics_addr: vars.optional("METRICS_ADDR"),
        };
        config.validate()?;
        Ok(config)
    }

    /// Policy for waiting on the read model.
    #[must_use]
    pub fn visibility_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.await_visibility_attempts.saturating_sub(1),
            ..RetryPolicy::visibility()
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (var, sub) in [
            ("GRAPH_POOL_SIZE", &self.graph),
            ("ENRICH_POOL_SIZE", &self.enrich),
            ("ORGANIZATION_POOL_SIZE", &self.organization),
        ] {
            if sub.pool_size == 0 {
                return Err(ConfigError::Invalid {
                    var: var.to_string(),
                    reason: "pool size must be at least 1".to_string(),
                });
            }
        }
        if self.log_entry_sync_concurrency == 0 {
            return Err(ConfigError::Invalid {
                var: "LOG_ENTRY_SYNC_CONCURRENCY".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.event_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                var: "EVENT_TIMEOUT_SECS".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

struct Vars<'a, F>(&'a F);

impl<F: Fn(&str) -> Option<String>> Vars<'_, F> {
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        self.optional(key).ok_or(ConfigError::EnvVarNotSet(key))
    }

    fn parse<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(key) {
            None => Ok(default),
            Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                var: key.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    fn subscription(
        &self,
        prefix: &str,
        group: &str,
        pool_size: usize,
    ) -> Result<SubscriptionConfig, ConfigError> {
        let key = |suffix: &str| format!("{prefix}_{suffix}");
        let ack_after_park: bool = self.parse(&key("ACK_AFTER_PARK"), true)?;
        Ok(SubscriptionConfig {
            group_name: self.string(&key("GROUP_NAME"), group),
            pool_size: self.parse(&key("POOL_SIZE"), pool_size)?,
            enabled: self.parse(&key("ENABLED"), true)?,
            ack_mode: if ack_after_park {
                AckMode::AckAfterPark
            } else {
                AckMode::ParkOnly
            },
        })
    }
}

//! Command client decorator that retries transient failures.

use crate::retry::{RetryPolicy, retry_with_predicate};
use async_trait::async_trait;
use crm_projections_core::command::{Command, CommandAck, CommandClient, CommandError};
use std::sync::Arc;

/// Wraps a [`CommandClient`] so every send is retried with backoff while the
/// command side is unavailable. Validation and rejection fail immediately.
#[derive(Clone)]
pub struct RetryingCommandClient {
    inner: Arc<dyn CommandClient>,
    policy: RetryPolicy,
}

impl RetryingCommandClient {
    /// Wrap `inner`.
    #[must_use]
    pub fn new(inner: Arc<dyn CommandClient>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl CommandClient for RetryingCommandClient {
    async fn send(&self, command: &Command) -> Result<CommandAck, CommandError> {
        command.validate()?;
        let result = retry_with_predicate(
            self.policy.clone(),
            || self.inner.send(command),
            CommandError::is_transient,
        )
        .await;
        if let Err(error) = &result {
            tracing::error!(
                command = command.name(),
                tenant = command.tenant(),
                target = command.target_id(),
                error = %error,
                "Command failed"
            );
        }
        result
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Flaky {
        failures: usize,
        calls: AtomicUsize,
        error: CommandError,
    }

    #[async_trait]
    impl CommandClient for Flaky {
        async fn send(&self, command: &Command) -> Result<CommandAck, CommandError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(self.error.clone())
            } else {
                Ok(CommandAck {
                    id: command.target_id().to_string(),
                })
            }
        }
    }

    fn refresh() -> Command {
        Command::RefreshContractLtv {
            tenant: "acme".into(),
            contract_id: "c1".into(),
            app_source: "projections".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_while_unavailable() {
        let flaky = Arc::new(Flaky {
            failures: 2,
            calls: AtomicUsize::new(0),
            error: CommandError::Unavailable("connection refused".into()),
        });
        let client = RetryingCommandClient::new(flaky.clone(), RetryPolicy::default());

        let ack = client.send(&refresh()).await.unwrap();
        assert_eq!(ack.id, "c1");
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn rejection_is_not_retried() {
        let flaky = Arc::new(Flaky {
            failures: 5,
            calls: AtomicUsize::new(0),
            error: CommandError::Rejected("unknown contract".into()),
        });
        let client = RetryingCommandClient::new(flaky.clone(), RetryPolicy::default());

        assert!(matches!(client.send(&refresh()).await, Err(CommandError::Rejected(_))));
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalid_command_never_reaches_inner() {
        let flaky = Arc::new(Flaky {
            failures: 0,
            calls: AtomicUsize::new(0),
            error: CommandError::Unavailable(String::new()),
        });
        let client = RetryingCommandClient::new(flaky.clone(), RetryPolicy::default());
        let command = Command::RefreshContractLtv {
            tenant: String::new(),
            contract_id: "c1".into(),
            app_source: String::new(),
        };

        assert!(matches!(client.send(&command).await, Err(CommandError::Validation { .. })));
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 0);
    }
}

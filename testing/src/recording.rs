//! Recording doubles for the outbound ports.

#![allow(clippy::unwrap_used)]
#![allow(clippy::missing_panics_doc)]

use async_trait::async_trait;
use crm_projections_core::command::{Command, CommandAck, CommandClient, CommandError};
use crm_projections_core::notifier::{EventCompleted, EventCompletedNotifier, NotifyError};
use crm_projections_core::sync::{SyncError, SyncRun, SyncRunStore, SyncStatus};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type Effect = Arc<dyn Fn(&Command) + Send + Sync>;

/// [`CommandClient`] that records every command.
///
/// Can fail the first N sends, and can run an effect per accepted command to
/// stand in for the event the command side would emit.
#[derive(Clone, Default)]
pub struct RecordingCommandClient {
    sent: Arc<Mutex<Vec<Command>>>,
    failures: Arc<AtomicUsize>,
    failure: Arc<Mutex<Option<CommandError>>>,
    generated: Arc<AtomicUsize>,
    effect: Option<Effect>,
}

impl std::fmt::Debug for RecordingCommandClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingCommandClient")
            .field("sent", &self.sent.lock().unwrap().len())
            .finish_non_exhaustive()
    }
}

impl RecordingCommandClient {
    /// Client that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` sends with `error`.
    #[must_use]
    pub fn failing(self, times: usize, error: CommandError) -> Self {
        self.failures.store(times, Ordering::SeqCst);
        *self.failure.lock().unwrap() = Some(error);
        self
    }

    /// Run `effect` for every accepted command.
    #[must_use]
    pub fn with_effect(mut self, effect: impl Fn(&Command) + Send + Sync + 'static) -> Self {
        self.effect = Some(Arc::new(effect));
        self
    }

    /// Every accepted command, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<Command> {
        self.sent.lock().unwrap().clone()
    }

    /// Names of accepted commands, in order.
    #[must_use]
    pub fn sent_names(&self) -> Vec<&'static str> {
        self.sent.lock().unwrap().iter().map(Command::name).collect()
    }
}

#[async_trait]
impl CommandClient for RecordingCommandClient {
    async fn send(&self, command: &Command) -> Result<CommandAck, CommandError> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            if let Some(error) = self.failure.lock().unwrap().clone() {
                return Err(error);
            }
        }
        self.sent.lock().unwrap().push(command.clone());
        if let Some(effect) = &self.effect {
            effect(command);
        }
        let id = if command.target_id().is_empty() {
            format!("generated-{}", self.generated.fetch_add(1, Ordering::SeqCst) + 1)
        } else {
            command.target_id().to_string()
        };
        Ok(CommandAck { id })
    }
}

/// [`EventCompletedNotifier`] that records every signal.
#[derive(Clone, Debug, Default)]
pub struct RecordingNotifier {
    notified: Arc<Mutex<Vec<EventCompleted>>>,
    fail: Arc<AtomicBool>,
}

impl RecordingNotifier {
    /// Notifier that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every notification.
    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Signals sent so far.
    #[must_use]
    pub fn notified(&self) -> Vec<EventCompleted> {
        self.notified.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventCompletedNotifier for RecordingNotifier {
    async fn notify(&self, completed: EventCompleted) -> Result<(), NotifyError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotifyError("notifier offline".to_string()));
        }
        self.notified.lock().unwrap().push(completed);
        Ok(())
    }
}

/// [`SyncRunStore`] keeping runs in memory.
#[derive(Clone, Debug, Default)]
pub struct InMemorySyncRunStore {
    runs: Arc<Mutex<Vec<(SyncRun, Vec<SyncStatus>)>>>,
}

impl InMemorySyncRunStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Saved runs.
    #[must_use]
    pub fn runs(&self) -> Vec<(SyncRun, Vec<SyncStatus>)> {
        self.runs.lock().unwrap().clone()
    }
}

#[async_trait]
impl SyncRunStore for InMemorySyncRunStore {
    async fn save(&self, run: &SyncRun, statuses: &[SyncStatus]) -> Result<(), SyncError> {
        self.runs.lock().unwrap().push((run.clone(), statuses.to_vec()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn failing_client_recovers_after_n_sends() {
        let client =
            RecordingCommandClient::new().failing(1, CommandError::Unavailable("down".into()));
        let command = Command::CloseWonOpportunity {
            tenant: "acme".into(),
            opportunity_id: "op1".into(),
            app_source: String::new(),
        };
        assert!(client.send(&command).await.is_err());
        assert_eq!(client.send(&command).await.unwrap().id, "op1");
        assert_eq!(client.sent_names(), vec!["CloseWonOpportunity"]);
    }
}

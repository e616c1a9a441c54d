//! Batch synchronisation of externally sourced records.
//!
//! A sync run takes records from one external system, upserts each one and
//! reports a [`SyncStatus`] per record. The run is summarised as a
//! [`SyncResult`] and persisted through a [`SyncRunStore`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// External systems records may be synced from.
pub const ACCEPTED_EXTERNAL_SYSTEMS: &[&str] = &[
    "openline",
    "webscrape",
    "hubspot",
    "zendesk_support",
    "pipedrive",
    "intercom",
    "salesforce",
    "stripe",
    "mixpanel",
    "close",
    "outlook",
    "gmail",
    "slack",
    "unthread",
    "attio",
];

/// Whether `external_system` may be synced from. Case-insensitive.
#[must_use]
pub fn is_accepted_external_system(external_system: &str) -> bool {
    let lowered = external_system.to_lowercase();
    ACCEPTED_EXTERNAL_SYSTEMS.contains(&lowered.as_str())
}

/// Errors that abort a whole sync run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The tenant does not exist
    #[error("Tenant not valid")]
    TenantNotValid,

    /// A record has no external system
    #[error("Missing external system")]
    MissingExternalSystem,

    /// A record names an external system that is not accepted
    #[error("External system {0} not accepted")]
    ExternalSystemNotAccepted(String),

    /// The run could not be persisted or read
    #[error("Sync store error: {0}")]
    Store(String),
}

/// Outcome of one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncOutcome {
    /// Upserted
    Success,
    /// Flagged to skip by the source
    Skipped,
    /// Failed; see the reason
    Failed,
}

impl SyncOutcome {
    /// Storage form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Skipped => "SKIPPED",
            Self::Failed => "FAILED",
        }
    }
}

/// Status of one synced record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    /// Outcome
    pub outcome: SyncOutcome,
    /// Why it was skipped or failed
    pub reason: String,
}

impl SyncStatus {
    /// Record upserted.
    #[must_use]
    pub const fn success() -> Self {
        Self {
            outcome: SyncOutcome::Success,
            reason: String::new(),
        }
    }

    /// Record skipped.
    #[must_use]
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            outcome: SyncOutcome::Skipped,
            reason: reason.into(),
        }
    }

    /// Record failed.
    #[must_use]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            outcome: SyncOutcome::Failed,
            reason: reason.into(),
        }
    }
}

/// Summary of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    /// Records upserted
    pub completed: usize,
    /// Records skipped
    pub skipped: usize,
    /// Records failed
    pub failed: usize,
    /// Reasons of failed records
    pub reasons: Vec<String>,
}

impl SyncResult {
    /// Summarise statuses.
    #[must_use]
    pub fn from_statuses(statuses: &[SyncStatus]) -> Self {
        statuses.iter().fold(Self::default(), |mut acc, status| {
            match status.outcome {
                SyncOutcome::Success => acc.completed += 1,
                SyncOutcome::Skipped => acc.skipped += 1,
                SyncOutcome::Failed => {
                    acc.failed += 1;
                    acc.reasons.push(status.reason.clone());
                }
            }
            acc
        })
    }
}

/// Identity of a sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRun {
    /// Tenant
    pub tenant: String,
    /// External system of the batch
    pub external_system: String,
    /// Calling application
    pub app_source: String,
    /// Entity type synced, e.g. `logEntry`
    pub entity: String,
    /// When the run started
    pub sync_date: DateTime<Utc>,
}

/// Persists per-record statuses of a run.
#[async_trait]
pub trait SyncRunStore: Send + Sync {
    /// Save the statuses of one run.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Store`] if the statuses could not be saved.
    async fn save(&self, run: &SyncRun, statuses: &[SyncStatus]) -> Result<(), SyncError>;
}

/// A log entry as sent by an external system.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogEntryData {
    /// External system id, e.g. `hubspot`
    pub external_system: String,
    /// Record id in the external system
    pub external_id: String,
    /// Link to the record
    pub external_url: String,
    /// Entity type in the external system
    pub external_source_entity: String,
    /// Calling application
    pub app_source: String,
    /// Body
    pub content: String,
    /// MIME type of the body
    pub content_type: String,
    /// When the record was created
    pub created_at: Option<DateTime<Utc>>,
    /// When the record was last changed
    pub updated_at: Option<DateTime<Utc>>,
    /// When the logged activity started
    pub started_at: Option<DateTime<Utc>>,
    /// External id of the author
    pub author_user: String,
    /// External id of the logged organization
    pub logged_organization: String,
    /// External ids of further logged organizations
    pub logged_organizations: Vec<String>,
    /// Fail the record when no logged organization resolves
    pub logged_entity_required: bool,
    /// Source asks to skip this record
    pub skip: bool,
    /// Why the source asks to skip
    pub skip_reason: String,
}

impl LogEntryData {
    /// Trim identifiers and lowercase the external system.
    pub fn normalize(&mut self) {
        self.external_system = self.external_system.trim().to_lowercase();
        self.external_id = self.external_id.trim().to_string();
        self.author_user = self.author_user.trim().to_string();
        self.logged_organization = self.logged_organization.trim().to_string();
        for org in &mut self.logged_organizations {
            *org = org.trim().to_string();
        }
        self.logged_organizations.retain(|org| !org.is_empty());
    }

    /// External ids of every logged organization, primary first, deduplicated.
    #[must_use]
    pub fn logged_organization_refs(&self) -> Vec<&str> {
        let mut refs: Vec<&str> = Vec::new();
        let candidates = std::iter::once(self.logged_organization.as_str())
            .chain(self.logged_organizations.iter().map(String::as_str));
        for candidate in candidates {
            if !candidate.is_empty() && !refs.contains(&candidate) {
                refs.push(candidate);
            }
        }
        refs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_counts_each_outcome() {
        let result = SyncResult::from_statuses(&[
            SyncStatus::success(),
            SyncStatus::skipped("draft"),
            SyncStatus::failed("organization not found"),
            SyncStatus::success(),
        ]);
        assert_eq!(result.completed, 2);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.failed, 1);
        assert_eq!(result.reasons, vec!["organization not found".to_string()]);
    }

    #[test]
    fn external_system_check_ignores_case() {
        assert!(is_accepted_external_system("HubSpot"));
        assert!(!is_accepted_external_system("myspace"));
        assert!(!is_accepted_external_system(""));
    }

    #[test]
    fn logged_organization_refs_are_deduplicated() {
        let mut data = LogEntryData {
            external_system: " HubSpot ".into(),
            logged_organization: "org-1".into(),
            logged_organizations: vec!["org-2".into(), " org-1 ".into(), String::new()],
            ..LogEntryData::default()
        };
        data.normalize();
        assert_eq!(data.external_system, "hubspot");
        assert_eq!(data.logged_organization_refs(), vec!["org-1", "org-2"]);
    }
}

//! Follow-up commands sent back to the command side.
//!
//! Handlers never write another aggregate's read model directly; they ask the
//! owning aggregate to recompute through a [`Command`], which comes back as an
//! event. Every command is an idempotent upsert, so resending is safe.

use crate::events::{EmailValidatedV2Event, ExternalSystem, LocationAddress, Source};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Command path errors.
#[derive(Error, Debug, Clone)]
pub enum CommandError {
    /// The command could not be built
    #[error("Invalid command {command}: {reason}")]
    Validation {
        /// Command name
        command: &'static str,
        /// What is wrong
        reason: String,
    },

    /// Transport failure, worth retrying
    #[error("Command service unavailable: {0}")]
    Unavailable(String),

    /// The command side refused the command
    #[error("Command rejected: {0}")]
    Rejected(String),

    /// Encoding failed
    #[error("Command serialization failed: {0}")]
    Serialization(String),
}

impl CommandError {
    /// Whether a retry could succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Acknowledgement returned by the command side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandAck {
    /// Id of the affected aggregate
    pub id: String,
}

/// Commands the projections issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
#[allow(missing_docs)]
pub enum Command {
    /// Recompute a contract's lifetime value.
    RefreshContractLtv {
        tenant: String,
        contract_id: String,
        app_source: String,
    },
    /// Recompute an organization's ARR forecast.
    RefreshOrganizationArr {
        tenant: String,
        organization_id: String,
        app_source: String,
    },
    /// Recompute an organization's renewal summary.
    RefreshOrganizationRenewalSummary {
        tenant: String,
        organization_id: String,
        app_source: String,
    },
    /// Recompute an organization's derived data, such as total LTV.
    RefreshOrganizationDerivedData {
        tenant: String,
        organization_id: String,
        app_source: String,
    },
    /// Set the organization's customer relationship and stage.
    UpdateOrganizationRelationship {
        tenant: String,
        organization_id: String,
        relationship: String,
        stage: String,
        app_source: String,
    },
    /// Set the organization's onboarding status.
    UpdateOnboardingStatus {
        tenant: String,
        organization_id: String,
        status: String,
        comments: String,
        caused_by_contract_id: String,
        app_source: String,
    },
    /// Close a renewal opportunity as won.
    CloseWonOpportunity {
        tenant: String,
        opportunity_id: String,
        app_source: String,
    },
    /// Move a renewal opportunity's forecast.
    UpdateRenewalOpportunity {
        tenant: String,
        opportunity_id: String,
        renewed_at: Option<DateTime<Utc>>,
        amount: f64,
        app_source: String,
    },
    /// Attach a location to an organization.
    AddOrganizationLocation {
        tenant: String,
        organization_id: String,
        raw_address: String,
        address: LocationAddress,
        app_source: String,
    },
    /// Adjust fields of a freshly created organization.
    UpdateOrganization {
        tenant: String,
        organization_id: String,
        market: String,
        industry: String,
        fields_mask: Vec<String>,
        app_source: String,
    },
    /// Record an email validation report on the email aggregate.
    RecordEmailValidation {
        tenant: String,
        email_id: String,
        report: EmailValidatedV2Event,
        app_source: String,
    },
    /// Create or update a log entry.
    UpsertLogEntry {
        tenant: String,
        log_entry_id: String,
        content: String,
        content_type: String,
        started_at: Option<DateTime<Utc>>,
        author_user_id: String,
        logged_organization_ids: Vec<String>,
        source: Source,
        external_system: ExternalSystem,
    },
}

impl Command {
    /// Command name, for logs and metrics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::RefreshContractLtv { .. } => "RefreshContractLtv",
            Self::RefreshOrganizationArr { .. } => "RefreshOrganizationArr",
            Self::RefreshOrganizationRenewalSummary { .. } => "RefreshOrganizationRenewalSummary",
            Self::RefreshOrganizationDerivedData { .. } => "RefreshOrganizationDerivedData",
            Self::UpdateOrganizationRelationship { .. } => "UpdateOrganizationRelationship",
            Self::UpdateOnboardingStatus { .. } => "UpdateOnboardingStatus",
            Self::CloseWonOpportunity { .. } => "CloseWonOpportunity",
            Self::UpdateRenewalOpportunity { .. } => "UpdateRenewalOpportunity",
            Self::AddOrganizationLocation { .. } => "AddOrganizationLocation",
            Self::UpdateOrganization { .. } => "UpdateOrganization",
            Self::RecordEmailValidation { .. } => "RecordEmailValidation",
            Self::UpsertLogEntry { .. } => "UpsertLogEntry",
        }
    }

    /// Tenant the command applies to.
    #[must_use]
    pub fn tenant(&self) -> &str {
        match self {
            Self::RefreshContractLtv { tenant, .. }
            | Self::RefreshOrganizationArr { tenant, .. }
            | Self::RefreshOrganizationRenewalSummary { tenant, .. }
            | Self::RefreshOrganizationDerivedData { tenant, .. }
            | Self::UpdateOrganizationRelationship { tenant, .. }
            | Self::UpdateOnboardingStatus { tenant, .. }
            | Self::CloseWonOpportunity { tenant, .. }
            | Self::UpdateRenewalOpportunity { tenant, .. }
            | Self::AddOrganizationLocation { tenant, .. }
            | Self::UpdateOrganization { tenant, .. }
            | Self::RecordEmailValidation { tenant, .. }
            | Self::UpsertLogEntry { tenant, .. } => tenant,
        }
    }

    /// Id of the target aggregate.
    #[must_use]
    pub fn target_id(&self) -> &str {
        match self {
            Self::RefreshContractLtv { contract_id, .. } => contract_id,
            Self::RefreshOrganizationArr { organization_id, .. }
            | Self::RefreshOrganizationRenewalSummary { organization_id, .. }
            | Self::RefreshOrganizationDerivedData { organization_id, .. }
            | Self::UpdateOrganizationRelationship { organization_id, .. }
            | Self::UpdateOnboardingStatus { organization_id, .. }
            | Self::AddOrganizationLocation { organization_id, .. }
            | Self::UpdateOrganization { organization_id, .. } => organization_id,
            Self::CloseWonOpportunity { opportunity_id, .. }
            | Self::UpdateRenewalOpportunity { opportunity_id, .. } => opportunity_id,
            Self::RecordEmailValidation { email_id, .. } => email_id,
            Self::UpsertLogEntry { log_entry_id, .. } => log_entry_id,
        }
    }

    /// Check required fields before sending.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Validation`] when the tenant or target id is
    /// empty. An upsert without an id creates a new log entry.
    pub fn validate(&self) -> Result<(), CommandError> {
        if self.tenant().is_empty() {
            return Err(CommandError::Validation {
                command: self.name(),
                reason: "tenant is empty".to_string(),
            });
        }
        if self.target_id().is_empty() && !matches!(self, Self::UpsertLogEntry { .. }) {
            return Err(CommandError::Validation {
                command: self.name(),
                reason: "target id is empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Sends commands to the command side.
#[async_trait]
pub trait CommandClient: Send + Sync {
    /// Send one command.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError`] when the command is invalid or not accepted.
    async fn send(&self, command: &Command) -> Result<CommandAck, CommandError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let cmd = Command::RefreshOrganizationArr {
            tenant: "acme".into(),
            organization_id: "org-1".into(),
            app_source: "projections".into(),
        };
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["type"], "REFRESH_ORGANIZATION_ARR");
        assert_eq!(cmd.target_id(), "org-1");
    }

    #[test]
    fn empty_target_fails_validation() {
        let cmd = Command::RefreshContractLtv {
            tenant: "acme".into(),
            contract_id: String::new(),
            app_source: String::new(),
        };
        assert!(matches!(cmd.validate(), Err(CommandError::Validation { .. })));
    }

    #[test]
    fn only_unavailable_is_transient() {
        assert!(CommandError::Unavailable("down".into()).is_transient());
        assert!(!CommandError::Rejected("no".into()).is_transient());
    }
}

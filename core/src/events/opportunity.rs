//! Opportunity payloads.

use super::{ExternalSystem, Source};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `V1_OPPORTUNITY_CREATE`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OpportunityCreateEvent {
    /// Tenant
    pub tenant: String,
    /// Name
    pub name: String,
    /// Expected amount
    pub amount: f64,
    /// Maximum amount
    pub max_amount: f64,
    /// `NBO`, `UPSELL`, `CROSS_SELL` or `RENEWAL`
    pub internal_type: String,
    /// Type in the external system
    pub external_type: String,
    /// `OPEN`, `CLOSED_WON` or `CLOSED_LOST`
    pub internal_stage: String,
    /// Stage in the external system
    pub external_stage: String,
    /// Estimated close date
    pub estimated_closed_at: Option<DateTime<Utc>>,
    /// Owner
    pub owner_user_id: String,
    /// Creator
    pub created_by_user_id: String,
    /// Notes
    pub general_notes: String,
    /// Next steps
    pub next_steps: String,
    /// Organization the opportunity belongs to
    pub organization_id: String,
    /// Currency code
    pub currency: String,
    /// Likelihood rate, 0 to 100
    pub likelihood_rate: i64,
    /// Origin
    pub source: Source,
    /// External system link
    pub external_system: ExternalSystem,
    /// Creation time
    pub created_at: Option<DateTime<Utc>>,
    /// Update time
    pub updated_at: Option<DateTime<Utc>>,
}

/// `V1_OPPORTUNITY_UPDATE`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OpportunityUpdateEvent {
    /// Tenant
    pub tenant: String,
    /// Name
    pub name: String,
    /// Expected amount
    pub amount: f64,
    /// Maximum amount
    pub max_amount: f64,
    /// Type in the external system
    pub external_type: String,
    /// Stage in the external system
    pub external_stage: String,
    /// Internal stage
    pub internal_stage: String,
    /// Estimated close date
    pub estimated_closed_at: Option<DateTime<Utc>>,
    /// Owner
    pub owner_user_id: String,
    /// Currency code
    pub currency: String,
    /// Likelihood rate
    pub likelihood_rate: i64,
    /// Origin of the update
    pub source: String,
    /// External system link
    pub external_system: ExternalSystem,
    /// Fields to write; empty means all
    pub fields_mask: Vec<String>,
    /// Update time
    pub updated_at: Option<DateTime<Utc>>,
}

/// `V1_OPPORTUNITY_UPDATE_NEXT_CYCLE_DATE`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OpportunityUpdateNextCycleDateEvent {
    /// Tenant
    pub tenant: String,
    /// Next renewal date
    pub renewed_at: Option<DateTime<Utc>>,
    /// Update time
    pub updated_at: Option<DateTime<Utc>>,
}

/// `V1_OPPORTUNITY_CREATE_RENEWAL`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OpportunityCreateRenewalEvent {
    /// Tenant
    pub tenant: String,
    /// Contract being renewed
    pub contract_id: String,
    /// Internal stage
    pub internal_stage: String,
    /// `HIGH`, `MEDIUM`, `LOW` or `ZERO`
    pub renewal_likelihood: String,
    /// Renewal approved by the account owner
    pub renewal_approved: bool,
    /// Renewal date
    pub renewed_at: Option<DateTime<Utc>>,
    /// Adjusted renewal rate, 0 to 100
    pub renewal_adjusted_rate: i64,
    /// Origin
    pub source: Source,
    /// Creation time
    pub created_at: Option<DateTime<Utc>>,
    /// Update time
    pub updated_at: Option<DateTime<Utc>>,
}

/// `V1_OPPORTUNITY_UPDATE_RENEWAL`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OpportunityUpdateRenewalEvent {
    /// Tenant
    pub tenant: String,
    /// Likelihood
    pub renewal_likelihood: String,
    /// Forecast amount
    pub amount: f64,
    /// Comment recorded with the change
    pub comments: String,
    /// User who made the change
    pub updated_by_user_id: String,
    /// Owner
    pub owner_user_id: String,
    /// Renewal approved
    pub renewal_approved: bool,
    /// Renewal date
    pub renewed_at: Option<DateTime<Utc>>,
    /// Adjusted renewal rate
    pub renewal_adjusted_rate: i64,
    /// Fields to write; empty means all
    pub fields_mask: Vec<String>,
    /// Update time
    pub updated_at: Option<DateTime<Utc>>,
}

/// `V1_OPPORTUNITY_CLOSE_LOOSE`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OpportunityCloseLostEvent {
    /// Tenant
    pub tenant: String,
    /// User who closed it
    pub user_id: String,
    /// Close time
    pub closed_at: Option<DateTime<Utc>>,
    /// Update time
    pub updated_at: Option<DateTime<Utc>>,
}

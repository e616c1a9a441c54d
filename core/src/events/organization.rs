//! Organization payloads.

use super::location::LocationAddress;
use super::{ExternalSystem, Source};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `V1_ORGANIZATION_CREATE`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrganizationCreateEvent {
    /// Tenant
    pub tenant: String,
    /// Display name
    pub name: String,
    /// Hidden from listings
    pub hide: bool,
    /// Free-text description
    pub description: String,
    /// Website as entered
    pub website: String,
    /// Industry
    pub industry: String,
    /// Sub-industry
    pub sub_industry: String,
    /// Industry group
    pub industry_group: String,
    /// Target audience
    pub target_audience: String,
    /// Value proposition
    pub value_proposition: String,
    /// Publicly traded
    pub is_public: bool,
    /// Head count
    pub employees: i64,
    /// Market, e.g. `B2B`
    pub market: String,
    /// Last funding round
    pub last_funding_round: String,
    /// Last funding amount
    pub last_funding_amount: String,
    /// Reference id in the customer's own systems
    pub reference_id: String,
    /// Internal note
    pub note: String,
    /// Logo url
    pub logo_url: String,
    /// Icon url
    pub icon_url: String,
    /// Headquarters
    pub headquarters: String,
    /// Year founded
    pub year_founded: Option<i64>,
    /// Yearly revenue
    pub yearly_revenue: f64,
    /// Employee growth rate
    pub employee_growth_rate: String,
    /// Slack channel
    pub slack_channel_id: String,
    /// Relationship, e.g. `CUSTOMER`
    pub relationship: String,
    /// Stage within the relationship
    pub stage: String,
    /// Lead source
    pub lead_source: String,
    /// Origin
    pub source: Source,
    /// External system link
    pub external_system: ExternalSystem,
    /// Creation time
    pub created_at: Option<DateTime<Utc>>,
    /// Update time
    pub updated_at: Option<DateTime<Utc>>,
}

/// `V1_ORGANIZATION_UPDATE`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrganizationUpdateEvent {
    /// Tenant
    pub tenant: String,
    /// Display name
    pub name: String,
    /// Hidden from listings
    pub hide: bool,
    /// Free-text description
    pub description: String,
    /// Website as entered
    pub website: String,
    /// Industry
    pub industry: String,
    /// Sub-industry
    pub sub_industry: String,
    /// Industry group
    pub industry_group: String,
    /// Target audience
    pub target_audience: String,
    /// Value proposition
    pub value_proposition: String,
    /// Publicly traded
    pub is_public: bool,
    /// Head count
    pub employees: i64,
    /// Market
    pub market: String,
    /// Last funding round
    pub last_funding_round: String,
    /// Last funding amount
    pub last_funding_amount: String,
    /// Reference id
    pub reference_id: String,
    /// Internal note
    pub note: String,
    /// Logo url
    pub logo_url: String,
    /// Icon url
    pub icon_url: String,
    /// Headquarters
    pub headquarters: String,
    /// Year founded
    pub year_founded: Option<i64>,
    /// Yearly revenue
    pub yearly_revenue: f64,
    /// Employee growth rate
    pub employee_growth_rate: String,
    /// Slack channel
    pub slack_channel_id: String,
    /// Relationship
    pub relationship: String,
    /// Stage
    pub stage: String,
    /// Origin of the update
    pub source: String,
    /// External system link
    pub external_system: ExternalSystem,
    /// Fields to write; empty means all
    pub fields_mask: Vec<String>,
    /// Update time
    pub updated_at: Option<DateTime<Utc>>,
}

/// `V1_ORGANIZATION_UNLINK_DOMAIN`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrganizationUnlinkDomainEvent {
    /// Tenant
    pub tenant: String,
    /// Domain to unlink
    pub domain: String,
}

/// `V1_ORGANIZATION_REMOVE_SOCIAL`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrganizationRemoveSocialEvent {
    /// Tenant
    pub tenant: String,
    /// Social node id, may be empty
    pub social_id: String,
    /// Social url, used when the id is empty
    pub url: String,
}

/// `V1_ORGANIZATION_REQUEST_ENRICH`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrganizationRequestEnrichEvent {
    /// Tenant
    pub tenant: String,
    /// Website to derive the primary domain from
    pub website: String,
    /// Request time
    pub requested_at: Option<DateTime<Utc>>,
}

/// Typed value of a custom field.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CustomFieldValue {
    /// Text value
    pub str: Option<String>,
    /// Integer value
    pub int: Option<i64>,
    /// Decimal value
    pub decimal: Option<f64>,
    /// Boolean value
    pub bool: Option<bool>,
    /// Date value
    pub time: Option<DateTime<Utc>>,
}

/// `V1_ORGANIZATION_UPSERT_CUSTOM_FIELD`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrganizationUpsertCustomFieldEvent {
    /// Tenant
    pub tenant: String,
    /// Custom field node id
    pub custom_field_id: String,
    /// Field name
    pub custom_field_name: String,
    /// `TEXT`, `INTEGER`, `DECIMAL`, `BOOL` or `DATETIME`
    pub custom_field_data_type: String,
    /// Value
    pub custom_field_value: CustomFieldValue,
    /// Template the field was created from
    pub template_id: Option<String>,
    /// Origin
    pub source: String,
    /// Creation time
    pub created_at: Option<DateTime<Utc>>,
    /// Update time
    pub updated_at: Option<DateTime<Utc>>,
}

/// `V1_ORGANIZATION_ADD_PARENT`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrganizationAddParentEvent {
    /// Tenant
    pub tenant: String,
    /// Parent organization
    pub parent_organization_id: String,
    /// Relationship type, e.g. `subsidiary`
    #[serde(rename = "type")]
    pub relation_type: String,
}

/// `V1_ORGANIZATION_REMOVE_PARENT`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrganizationRemoveParentEvent {
    /// Tenant
    pub tenant: String,
    /// Parent organization
    pub parent_organization_id: String,
}

/// `V1_ORGANIZATION_UPDATE_ONBOARDING_STATUS`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrganizationUpdateOnboardingStatusEvent {
    /// Tenant
    pub tenant: String,
    /// New status, e.g. `NOT_STARTED`, `DONE`
    pub status: String,
    /// Free-text comment
    pub comments: String,
    /// User who changed the status
    pub updated_by_user_id: String,
    /// Contract whose status change triggered the update
    pub caused_by_contract_id: String,
    /// Update time
    pub updated_at: Option<DateTime<Utc>>,
}

/// `V1_ORGANIZATION_ADD_LOCATION`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrganizationAddLocationEvent {
    /// Tenant
    pub tenant: String,
    /// New location node id
    pub location_id: String,
    /// Location name
    pub name: String,
    /// Raw address
    pub raw_address: String,
    /// Structured address
    pub location_address: LocationAddress,
    /// Origin
    pub source: Source,
    /// Creation time
    pub created_at: Option<DateTime<Utc>>,
}

//! Service line item payloads.

use super::Source;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `V1_SERVICE_LINE_ITEM_CREATE`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceLineItemCreateEvent {
    /// Tenant
    pub tenant: String,
    /// Product name
    pub name: String,
    /// `MONTHLY`, `QUARTERLY`, `ANNUALLY`, `ONCE`, `USAGE`
    pub billed: String,
    /// Quantity
    pub quantity: i64,
    /// Unit price
    pub price: f64,
    /// First version of this line item
    pub parent_id: String,
    /// Contract the item belongs to
    pub contract_id: String,
    /// Start of service
    pub started_at: Option<DateTime<Utc>>,
    /// End of service
    pub ended_at: Option<DateTime<Utc>>,
    /// Comments
    pub comments: String,
    /// VAT rate
    pub vat_rate: f64,
    /// Origin
    pub source: Source,
    /// Creation time
    pub created_at: Option<DateTime<Utc>>,
    /// Update time
    pub updated_at: Option<DateTime<Utc>>,
}

/// `V1_SERVICE_LINE_ITEM_UPDATE`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceLineItemUpdateEvent {
    /// Tenant
    pub tenant: String,
    /// Product name
    pub name: String,
    /// Billing cadence
    pub billed: String,
    /// Quantity
    pub quantity: i64,
    /// Unit price
    pub price: f64,
    /// Comments
    pub comments: String,
    /// VAT rate
    pub vat_rate: f64,
    /// Start of service
    pub started_at: Option<DateTime<Utc>>,
    /// Origin of the update
    pub source: Source,
    /// Update time
    pub updated_at: Option<DateTime<Utc>>,
}

/// `V1_SERVICE_LINE_ITEM_CLOSE`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceLineItemCloseEvent {
    /// Tenant
    pub tenant: String,
    /// End of service
    pub ended_at: Option<DateTime<Utc>>,
    /// Closed by cancellation
    pub is_canceled: bool,
    /// Update time
    pub updated_at: Option<DateTime<Utc>>,
}

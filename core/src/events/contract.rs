//! Contract payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `V1_CONTRACT_DELETE`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContractDeleteEvent {
    /// Tenant
    pub tenant: String,
    /// User who deleted the contract
    pub logged_in_user_id: String,
    /// Deletion time
    pub updated_at: Option<DateTime<Utc>>,
}

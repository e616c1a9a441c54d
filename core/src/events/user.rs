//! User payloads.

use super::Source;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `V1_USER_CREATE`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserCreateEvent {
    /// Tenant
    pub tenant: String,
    /// Full name
    pub name: String,
    /// First name
    pub first_name: String,
    /// Last name
    pub last_name: String,
    /// Internal user of the platform operator
    pub internal: bool,
    /// Automated user
    pub bot: bool,
    /// Avatar url
    pub profile_photo_url: String,
    /// IANA timezone
    pub timezone: String,
    /// Origin
    pub source: Source,
    /// Creation time
    pub created_at: Option<DateTime<Utc>>,
    /// Update time
    pub updated_at: Option<DateTime<Utc>>,
}

/// `V1_USER_UPDATE`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserUpdateEvent {
    /// Tenant
    pub tenant: String,
    /// Full name
    pub name: String,
    /// First name
    pub first_name: String,
    /// Last name
    pub last_name: String,
    /// Internal user
    pub internal: bool,
    /// Automated user
    pub bot: bool,
    /// Avatar url
    pub profile_photo_url: String,
    /// IANA timezone
    pub timezone: String,
    /// Origin of the update
    pub source: String,
    /// Update time
    pub updated_at: Option<DateTime<Utc>>,
}

/// `V1_USER_JOB_ROLE_LINK`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserLinkJobRoleEvent {
    /// Tenant
    pub tenant: String,
    /// Job role node id
    pub job_role_id: String,
    /// Link time
    pub updated_at: Option<DateTime<Utc>>,
}

/// `V1_USER_ADD_ROLE` and `V1_USER_REMOVE_ROLE`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserRoleEvent {
    /// Tenant
    pub tenant: String,
    /// Role name, e.g. `ADMIN`
    pub role: String,
    /// Change time
    pub at: Option<DateTime<Utc>>,
}

//! Tenant payloads: billing profile, settings and bank accounts.

use super::Source;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `V1_TENANT_ADD_BILLING_PROFILE`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[allow(missing_docs)]
pub struct TenantBillingProfileCreateEvent {
    pub tenant: String,
    pub id: String,
    pub legal_name: String,
    pub phone: String,
    pub address_line1: String,
    pub address_line2: String,
    pub address_line3: String,
    pub locality: String,
    pub country: String,
    pub region: String,
    pub zip: String,
    pub vat_number: String,
    pub send_invoices_from: String,
    pub send_invoices_bcc: String,
    pub can_pay_with_pigeon: bool,
    pub can_pay_with_bank_transfer: bool,
    pub check: bool,
    pub source: Source,
    pub created_at: Option<DateTime<Utc>>,
}

/// `V1_TENANT_UPDATE_BILLING_PROFILE`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[allow(missing_docs)]
pub struct TenantBillingProfileUpdateEvent {
    pub tenant: String,
    pub id: String,
    pub legal_name: String,
    pub phone: String,
    pub address_line1: String,
    pub address_line2: String,
    pub address_line3: String,
    pub locality: String,
    pub country: String,
    pub region: String,
    pub zip: String,
    pub vat_number: String,
    pub send_invoices_from: String,
    pub send_invoices_bcc: String,
    pub can_pay_with_pigeon: bool,
    pub can_pay_with_bank_transfer: bool,
    pub check: bool,
    pub fields_mask: Vec<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// `V1_TENANT_UPDATE_SETTINGS`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TenantSettingsUpdateEvent {
    /// Tenant
    pub tenant: String,
    /// Logo file id
    pub logo_repository_file_id: String,
    /// Base currency code
    pub base_currency: String,
    /// Invoicing turned on
    pub invoicing_enabled: bool,
    /// Invoices billed after the period
    pub invoicing_postpaid: bool,
    /// Fields to write; empty means all
    pub fields_mask: Vec<String>,
    /// Update time
    pub updated_at: Option<DateTime<Utc>>,
}

/// `V1_TENANT_ADD_BANK_ACCOUNT`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[allow(missing_docs)]
pub struct BankAccountCreateEvent {
    pub tenant: String,
    pub id: String,
    pub bank_name: String,
    pub bank_transfer_enabled: bool,
    pub allow_international: bool,
    pub currency: String,
    pub iban: String,
    pub bic: String,
    pub sort_code: String,
    pub account_number: String,
    pub routing_number: String,
    pub other_details: String,
    pub source: Source,
    pub created_at: Option<DateTime<Utc>>,
}

/// `V1_TENANT_UPDATE_BANK_ACCOUNT`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[allow(missing_docs)]
pub struct BankAccountUpdateEvent {
    pub tenant: String,
    pub id: String,
    pub bank_name: String,
    pub bank_transfer_enabled: bool,
    pub allow_international: bool,
    pub currency: String,
    pub iban: String,
    pub bic: String,
    pub sort_code: String,
    pub account_number: String,
    pub routing_number: String,
    pub other_details: String,
    pub fields_mask: Vec<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// `V1_TENANT_DELETE_BANK_ACCOUNT`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BankAccountDeleteEvent {
    /// Tenant
    pub tenant: String,
    /// Bank account node id
    pub id: String,
    /// Deletion time
    pub deleted_at: Option<DateTime<Utc>>,
}

//! Invoice payloads.

use super::Source;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `V1_INVOICE_CREATE_FOR_CONTRACT`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[allow(clippy::struct_excessive_bools)]
pub struct InvoiceCreateForContractEvent {
    /// Tenant
    pub tenant: String,
    /// Contract the invoice bills
    pub contract_id: String,
    /// Currency code
    pub currency: String,
    /// Billing period start
    pub period_start_date: Option<DateTime<Utc>>,
    /// Billing period end
    pub period_end_date: Option<DateTime<Utc>>,
    /// Billing cycle length
    pub billing_cycle_in_months: i64,
    /// Not sent to the customer
    pub dry_run: bool,
    /// Preview of the next cycle
    pub preview: bool,
    /// Outside the regular cycle
    pub off_cycle: bool,
    /// Billed after the period
    pub postpaid: bool,
    /// Note printed on the invoice
    pub note: String,
    /// Origin
    pub source: Source,
    /// Creation time
    pub created_at: Option<DateTime<Utc>>,
}

/// One line of a filled invoice.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InvoiceLineEvent {
    /// Invoice line node id
    pub id: String,
    /// Product name
    pub name: String,
    /// Unit price
    pub price: f64,
    /// Quantity
    pub quantity: i64,
    /// Net amount
    pub amount: f64,
    /// VAT amount
    pub vat: f64,
    /// Gross amount
    pub total_amount: f64,
    /// Service line item billed by this line
    pub service_line_item_id: String,
    /// Billing cadence of the service line item
    pub billed_type: String,
    /// Creation time
    pub created_at: Option<DateTime<Utc>>,
}

/// `V1_INVOICE_FILL`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InvoiceFillEvent {
    /// Tenant
    pub tenant: String,
    /// Contract the invoice bills
    pub contract_id: String,
    /// Net amount
    pub amount: f64,
    /// VAT amount
    pub vat: f64,
    /// Gross amount
    pub total_amount: f64,
    /// Invoice number
    pub invoice_number: String,
    /// `INITIALIZED`, `DRAFT`, `DUE`, `PAID`, `VOID`
    pub status: String,
    /// Customer legal name
    pub customer_name: String,
    /// Customer email
    pub customer_email: String,
    /// Provider legal name
    pub provider_name: String,
    /// Note printed on the invoice
    pub note: String,
    /// Lines
    pub invoice_lines: Vec<InvoiceLineEvent>,
    /// Update time
    pub updated_at: Option<DateTime<Utc>>,
}

/// `V1_INVOICE_PDF_GENERATED`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InvoicePdfGeneratedEvent {
    /// Tenant
    pub tenant: String,
    /// Stored pdf file id
    pub repository_file_id: String,
    /// Update time
    pub updated_at: Option<DateTime<Utc>>,
}

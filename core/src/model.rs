//! Read-model entities decoded from graph nodes.
//!
//! Only the fields the projections read are mapped; the graph may hold more.

use crate::contract::{BilledType, ContractStatus};
use crate::graph::GraphNode;
use chrono::{DateTime, Utc};

/// Organization node.
#[derive(Debug, Clone, PartialEq, Default)]
#[allow(missing_docs)]
pub struct Organization {
    pub id: String,
    pub name: String,
    pub website: String,
    pub industry: String,
    pub market: String,
    pub employees: i64,
    pub year_founded: Option<i64>,
    pub value_proposition: String,
    pub description: String,
    pub is_public: Option<bool>,
    pub logo_url: String,
    pub icon_url: String,
    pub relationship: String,
    pub stage: String,
    pub onboarding_status: String,
    pub enriched_at: Option<DateTime<Utc>>,
    pub enrich_requested_at: Option<DateTime<Utc>>,
    pub enrich_failed_at: Option<DateTime<Utc>>,
}

impl Organization {
    /// Map a node.
    #[must_use]
    pub fn from_node(node: &GraphNode) -> Self {
        let p = &node.properties;
        Self {
            id: node.id.clone(),
            name: p.string("name"),
            website: p.string("website"),
            industry: p.string("industry"),
            market: p.string("market"),
            employees: p.get_i64("employees").unwrap_or_default(),
            year_founded: p.get_i64("yearFounded"),
            value_proposition: p.string("valueProposition"),
            description: p.string("description"),
            is_public: p.get_bool("isPublic"),
            logo_url: p.string("logoUrl"),
            icon_url: p.string("iconUrl"),
            relationship: p.string("relationship"),
            stage: p.string("stage"),
            onboarding_status: p.string("onboardingStatus"),
            enriched_at: p.get_datetime("enrichedAt"),
            enrich_requested_at: p.get_datetime("enrichRequestedAt"),
            enrich_failed_at: p.get_datetime("enrichFailedAt"),
        }
    }
}

/// Contract node.
#[derive(Debug, Clone, PartialEq, Default)]
#[allow(missing_docs, clippy::struct_excessive_bools)]
pub struct Contract {
    pub id: String,
    pub name: String,
    pub status: ContractStatus,
    pub approved: bool,
    pub auto_renew: bool,
    pub service_started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub length_in_months: i64,
    pub ltv: f64,
    pub deleted: bool,
}

impl Contract {
    /// Map a node.
    #[must_use]
    pub fn from_node(node: &GraphNode) -> Self {
        let p = &node.properties;
        Self {
            id: node.id.clone(),
            name: p.string("name"),
            status: ContractStatus::parse(p.get_str("status").unwrap_or_default()),
            approved: p.get_bool("approved").unwrap_or(false),
            auto_renew: p.get_bool("autoRenew").unwrap_or(false),
            service_started_at: p.get_datetime("serviceStartedAt"),
            ended_at: p.get_datetime("endedAt"),
            length_in_months: p.get_i64("lengthInMonths").unwrap_or_default(),
            ltv: p.get_f64("ltv").unwrap_or_default(),
            deleted: p.get_bool("deleted").unwrap_or(false),
        }
    }

    /// Whether the end date has passed.
    #[must_use]
    pub fn is_ended(&self, now: DateTime<Utc>) -> bool {
        self.ended_at.is_some_and(|ended| ended < now)
    }

    /// Name for messages, with a placeholder when unnamed.
    #[must_use]
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() { "Unnamed contract" } else { &self.name }
    }
}

/// Internal stage of an opportunity.
pub mod opportunity_stage {
    /// Still open
    pub const OPEN: &str = "OPEN";
    /// Won
    pub const CLOSED_WON: &str = "CLOSED_WON";
    /// Lost
    pub const CLOSED_LOST: &str = "CLOSED_LOST";
}

/// Opportunity node.
#[derive(Debug, Clone, PartialEq, Default)]
#[allow(missing_docs)]
pub struct Opportunity {
    pub id: String,
    pub name: String,
    pub internal_type: String,
    pub internal_stage: String,
    pub amount: f64,
    pub max_amount: f64,
    pub renewed_at: Option<DateTime<Utc>>,
    pub renewal_likelihood: String,
    pub renewal_adjusted_rate: i64,
    pub renewal_approved: bool,
}

impl Opportunity {
    /// Map a node.
    #[must_use]
    pub fn from_node(node: &GraphNode) -> Self {
        let p = &node.properties;
        Self {
            id: node.id.clone(),
            name: p.string("name"),
            internal_type: p.string("internalType"),
            internal_stage: p.string("internalStage"),
            amount: p.get_f64("amount").unwrap_or_default(),
            max_amount: p.get_f64("maxAmount").unwrap_or_default(),
            renewed_at: p.get_datetime("renewedAt"),
            renewal_likelihood: p.string("renewalLikelihood"),
            renewal_adjusted_rate: p.get_i64("renewalAdjustedRate").unwrap_or_default(),
            renewal_approved: p.get_bool("renewalApproved").unwrap_or(false),
        }
    }

    /// Open renewal opportunity.
    #[must_use]
    pub fn is_open_renewal(&self) -> bool {
        self.internal_type == "RENEWAL" && self.internal_stage == opportunity_stage::OPEN
    }
}

/// Service line item node.
#[derive(Debug, Clone, PartialEq, Default)]
#[allow(missing_docs)]
pub struct ServiceLineItem {
    pub id: String,
    pub name: String,
    pub billed: BilledType,
    pub quantity: i64,
    pub price: f64,
    pub parent_id: String,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub canceled: bool,
    pub paused: bool,
}

impl ServiceLineItem {
    /// Map a node.
    #[must_use]
    pub fn from_node(node: &GraphNode) -> Self {
        let p = &node.properties;
        Self {
            id: node.id.clone(),
            name: p.string("name"),
            billed: BilledType::parse(p.get_str("billed").unwrap_or_default()),
            quantity: p.get_i64("quantity").unwrap_or_default(),
            price: p.get_f64("price").unwrap_or_default(),
            parent_id: p.string("parentId"),
            started_at: p.get_datetime("startedAt"),
            ended_at: p.get_datetime("endedAt"),
            canceled: p.get_bool("isCanceled").unwrap_or(false),
            paused: p.get_bool("paused").unwrap_or(false),
        }
    }
}

/// Invoice node.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[allow(missing_docs)]
pub struct Invoice {
    pub id: String,
    pub status: String,
    pub preview: bool,
    pub dry_run: bool,
}

impl Invoice {
    /// Map a node.
    #[must_use]
    pub fn from_node(node: &GraphNode) -> Self {
        let p = &node.properties;
        Self {
            id: node.id.clone(),
            status: p.string("status"),
            preview: p.get_bool("preview").unwrap_or(false),
            dry_run: p.get_bool("dryRun").unwrap_or(false),
        }
    }

    /// Preview of a future cycle that was never issued.
    #[must_use]
    pub fn is_preview_cycle(&self) -> bool {
        self.preview && self.dry_run && matches!(self.status.as_str(), "INITIALIZED" | "DRAFT")
    }
}

/// Email node.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[allow(missing_docs)]
pub struct Email {
    pub id: String,
    pub raw_email: String,
    pub email: String,
}

impl Email {
    /// Map a node.
    #[must_use]
    pub fn from_node(node: &GraphNode) -> Self {
        let p = &node.properties;
        Self {
            id: node.id.clone(),
            raw_email: p.string("rawEmail"),
            email: p.string("email"),
        }
    }

    /// Validated address, falling back to the raw one.
    #[must_use]
    pub fn address(&self) -> &str {
        if self.email.is_empty() { &self.raw_email } else { &self.email }
    }
}

/// Domain node.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Domain {
    /// Domain name
    pub domain: String,
    /// Primary domain of its organization; unknown until validated
    pub primary: Option<bool>,
}

impl Domain {
    /// Map a node.
    #[must_use]
    pub fn from_node(node: &GraphNode) -> Self {
        Self {
            domain: node.id.clone(),
            primary: node.properties.get_bool("primary"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{NodeLabel, Properties};

    #[test]
    fn preview_cycle_requires_all_three_conditions() {
        let mut invoice = Invoice {
            id: "i1".into(),
            status: "DRAFT".into(),
            preview: true,
            dry_run: true,
        };
        assert!(invoice.is_preview_cycle());
        invoice.status = "DUE".into();
        assert!(!invoice.is_preview_cycle());
        invoice.status = "INITIALIZED".into();
        invoice.dry_run = false;
        assert!(!invoice.is_preview_cycle());
    }

    #[test]
    fn contract_maps_status_and_flags() {
        let node = GraphNode {
            label: NodeLabel::Contract,
            id: "c1".into(),
            properties: Properties::new()
                .with("status", "OUT_OF_CONTRACT")
                .with("approved", true)
                .with("lengthInMonths", 12_i64),
        };
        let contract = Contract::from_node(&node);
        assert_eq!(contract.status, ContractStatus::OutOfContract);
        assert!(contract.approved);
        assert_eq!(contract.length_in_months, 12);
        assert_eq!(contract.display_name(), "Unnamed contract");
    }
}

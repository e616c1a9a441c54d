//! Contract status derivation and lifetime value.
//!
//! Contract status is never set by a client. It is recomputed from dates and
//! the active renewal opportunity:
//!
//! ```text
//! DRAFT ──► SCHEDULED ──► LIVE ──► OUT_OF_CONTRACT
//!                           │
//!                           └────► ENDED
//! ```
//!
//! Both functions here are pure: the caller reads the graph and passes "now".

use crate::model::{Contract, ServiceLineItem};
use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Contract status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContractStatus {
    /// Never computed
    #[default]
    Undefined,
    /// Not yet approved
    Draft,
    /// Approved, service not started
    Scheduled,
    /// In service
    Live,
    /// Renewal date passed without auto-renew
    OutOfContract,
    /// End date passed
    Ended,
}

impl ContractStatus {
    /// Wire and graph form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Undefined => "",
            Self::Draft => "DRAFT",
            Self::Scheduled => "SCHEDULED",
            Self::Live => "LIVE",
            Self::OutOfContract => "OUT_OF_CONTRACT",
            Self::Ended => "ENDED",
        }
    }

    /// Parse the graph form; unknown values are [`ContractStatus::Undefined`].
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "DRAFT" => Self::Draft,
            "SCHEDULED" => Self::Scheduled,
            "LIVE" => Self::Live,
            "OUT_OF_CONTRACT" => Self::OutOfContract,
            "ENDED" => Self::Ended,
            _ => Self::Undefined,
        }
    }

    /// Whether lifetime value is accrued in this status.
    #[must_use]
    pub const fn accrues_ltv(self) -> bool {
        matches!(self, Self::Live | Self::OutOfContract | Self::Ended)
    }
}

impl fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Billing cadence of a service line item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BilledType {
    /// Not set
    #[default]
    None,
    /// Every month
    Monthly,
    /// Every three months
    Quarterly,
    /// Every year
    Annually,
    /// One-time charge
    Once,
    /// Usage based
    Usage,
}

impl BilledType {
    /// Parse the graph form; unknown values are [`BilledType::None`].
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "MONTHLY" => Self::Monthly,
            "QUARTERLY" => Self::Quarterly,
            "ANNUALLY" => Self::Annually,
            "ONCE" => Self::Once,
            "USAGE" => Self::Usage,
            _ => Self::None,
        }
    }

    /// Graph form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "",
            Self::Monthly => "MONTHLY",
            Self::Quarterly => "QUARTERLY",
            Self::Annually => "ANNUALLY",
            Self::Once => "ONCE",
            Self::Usage => "USAGE",
        }
    }

    /// Billed periodically.
    #[must_use]
    pub const fn is_recurring(self) -> bool {
        matches!(self, Self::Monthly | Self::Quarterly | Self::Annually)
    }

    /// Length of one period in days, for recurring cadences.
    #[must_use]
    pub const fn period_days(self) -> Option<f64> {
        match self {
            Self::Monthly => Some(30.0),
            Self::Quarterly => Some(90.0),
            Self::Annually => Some(365.0),
            _ => None,
        }
    }
}

/// Everything status derivation depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusInputs {
    /// Contract end date
    pub ended_at: Option<DateTime<Utc>>,
    /// Contract approved
    pub approved: bool,
    /// Service start date
    pub service_started_at: Option<DateTime<Utc>>,
    /// Contract renews automatically
    pub auto_renew: bool,
    /// Renewal date of the active renewal opportunity
    pub active_renewal_renewed_at: Option<DateTime<Utc>>,
}

impl StatusInputs {
    /// Inputs from a contract and the renewal date of its active renewal.
    #[must_use]
    pub const fn from_contract(
        contract: &Contract,
        active_renewal_renewed_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            ended_at: contract.ended_at,
            approved: contract.approved,
            service_started_at: contract.service_started_at,
            auto_renew: contract.auto_renew,
            active_renewal_renewed_at,
        }
    }
}

/// Status of a contract at `now`.
#[must_use]
pub fn derive_contract_status(inputs: &StatusInputs, now: DateTime<Utc>) -> ContractStatus {
    if inputs.ended_at.is_some_and(|ended| ended < now) {
        return ContractStatus::Ended;
    }
    if !inputs.approved {
        return ContractStatus::Draft;
    }
    match inputs.service_started_at {
        None => return ContractStatus::Scheduled,
        Some(started) if started > now => return ContractStatus::Scheduled,
        Some(_) => {}
    }
    if !inputs.auto_renew && inputs.active_renewal_renewed_at.is_some_and(|renewed| renewed < now) {
        return ContractStatus::OutOfContract;
    }
    ContractStatus::Live
}

/// Whole days between two instants, truncated toward zero.
#[must_use]
pub fn days_between(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end - start).num_hours() / 24
}

/// Number of billing periods of `billed` between `start` and `end`.
///
/// Zero when `start` is after `end` or the cadence is not recurring.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn calculate_duration(start: DateTime<Utc>, end: DateTime<Utc>, billed: BilledType) -> f64 {
    if start > end {
        return 0.0;
    }
    let days = days_between(start, end).abs() as f64;
    billed.period_days().map_or(0.0, |period| days / period)
}

/// Truncate to two decimals.
///
/// The cent count is first snapped to six decimals so binary representation
/// error (`19.99 * 100.0 == 1998.999...`) does not drop a cent.
#[must_use]
pub fn truncate_two_decimals(value: f64) -> f64 {
    let cents = (value * 100.0 * 1e6).round() / 1e6;
    cents.trunc() / 100.0
}

/// Lifetime value of a contract, truncated to two decimals.
///
/// Zero unless the contract is live, out of contract or ended. One-time items
/// count `quantity × price`; recurring items count `quantity × price ×
/// periods`, measured from their start to the earlier of their own end and
/// the contract's effective end (its end date once ended, else today).
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn calculate_ltv(contract: &Contract, items: &[ServiceLineItem], now: DateTime<Utc>) -> f64 {
    if !contract.status.accrues_ltv() {
        return 0.0;
    }

    let one_time: f64 = items
        .iter()
        .filter(|item| item.billed == BilledType::Once)
        .map(|item| item.quantity as f64 * item.price)
        .sum();

    let default_end = match contract.ended_at {
        Some(ended) if ended < now => ended,
        _ => now.date_naive().and_time(NaiveTime::MIN).and_utc(),
    };

    let recurring: f64 = items
        .iter()
        .filter(|item| item.billed.is_recurring())
        .filter_map(|item| {
            let start = item.started_at?;
            let end = match item.ended_at {
                Some(ended) if ended < default_end => ended,
                _ => default_end,
            };
            Some(item.quantity as f64 * item.price * calculate_duration(start, end, item.billed))
        })
        .sum();

    truncate_two_decimals(one_time + recurring)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).single().unwrap_or_default()
    }

    fn live_inputs() -> StatusInputs {
        StatusInputs {
            ended_at: None,
            approved: true,
            service_started_at: Some(now() - Duration::days(10)),
            auto_renew: true,
            active_renewal_renewed_at: None,
        }
    }

    #[test]
    fn ended_wins_over_everything() {
        let inputs = StatusInputs {
            ended_at: Some(now() - Duration::days(1)),
            approved: false,
            ..live_inputs()
        };
        assert_eq!(derive_contract_status(&inputs, now()), ContractStatus::Ended);
    }

    #[test]
    fn future_end_does_not_end() {
        let inputs = StatusInputs {
            ended_at: Some(now() + Duration::days(1)),
            ..live_inputs()
        };
        assert_eq!(derive_contract_status(&inputs, now()), ContractStatus::Live);
    }

    #[test]
    fn unapproved_is_draft() {
        let inputs = StatusInputs { approved: false, ..live_inputs() };
        assert_eq!(derive_contract_status(&inputs, now()), ContractStatus::Draft);
    }

    #[test]
    fn missing_or_future_start_is_scheduled() {
        let missing = StatusInputs { service_started_at: None, ..live_inputs() };
        let future = StatusInputs {
            service_started_at: Some(now() + Duration::days(3)),
            ..live_inputs()
        };
        assert_eq!(derive_contract_status(&missing, now()), ContractStatus::Scheduled);
        assert_eq!(derive_contract_status(&future, now()), ContractStatus::Scheduled);
    }

    #[test]
    fn passed_renewal_without_auto_renew_is_out_of_contract() {
        let inputs = StatusInputs {
            auto_renew: false,
            active_renewal_renewed_at: Some(now() - Duration::days(1)),
            ..live_inputs()
        };
        assert_eq!(derive_contract_status(&inputs, now()), ContractStatus::OutOfContract);

        let auto = StatusInputs { auto_renew: true, ..inputs };
        assert_eq!(derive_contract_status(&auto, now()), ContractStatus::Live);
    }

    #[test]
    fn duration_per_cadence() {
        let start = now() - Duration::days(90);
        assert!((calculate_duration(start, now(), BilledType::Monthly) - 3.0).abs() < f64::EPSILON);
        assert!(
            (calculate_duration(start, now(), BilledType::Quarterly) - 1.0).abs() < f64::EPSILON
        );
        assert!(calculate_duration(now(), start, BilledType::Monthly).abs() < f64::EPSILON);
        assert!(calculate_duration(start, now(), BilledType::Once).abs() < f64::EPSILON);
    }

    fn item(
        billed: BilledType,
        quantity: i64,
        price: f64,
        started_at: Option<DateTime<Utc>>,
    ) -> ServiceLineItem {
        ServiceLineItem {
            id: format!("sli-{quantity}-{price}"),
            billed,
            quantity,
            price,
            started_at,
            ..ServiceLineItem::default()
        }
    }

    #[test]
    fn monthly_item_over_ninety_days_of_ended_contract() {
        let ended = now() - Duration::days(5);
        let contract = Contract {
            status: ContractStatus::Ended,
            ended_at: Some(ended),
            ..Contract::default()
        };
        let items = vec![item(BilledType::Monthly, 1, 100.0, Some(ended - Duration::days(90)))];
        assert!((calculate_ltv(&contract, &items, now()) - 300.0).abs() < f64::EPSILON);
    }

    #[test]
    fn draft_contract_has_no_ltv() {
        let contract = Contract { status: ContractStatus::Draft, ..Contract::default() };
        let items = vec![item(BilledType::Once, 2, 50.0, None)];
        assert!(calculate_ltv(&contract, &items, now()).abs() < f64::EPSILON);
    }

    #[test]
    fn item_end_before_contract_end_caps_duration() {
        let contract = Contract { status: ContractStatus::Live, ..Contract::default() };
        let start = now() - Duration::days(400);
        let mut capped = item(BilledType::Annually, 1, 365.0, Some(start));
        capped.ended_at = Some(start + Duration::days(365));
        assert!((calculate_ltv(&contract, &[capped], now()) - 365.0).abs() < f64::EPSILON);
    }

    #[test]
    fn one_time_ltv_keeps_every_cent() {
        let contract = Contract { status: ContractStatus::Live, ..Contract::default() };
        for (price, expected) in [(1.15, 1.15), (0.29, 0.29), (4.35, 4.35), (19.99, 19.99)] {
            let items = vec![item(BilledType::Once, 1, price, None)];
            let ltv = calculate_ltv(&contract, &items, now());
            assert!((ltv - expected).abs() < 1e-9, "price {price} gave {ltv}");
        }
        let items = vec![
            item(BilledType::Once, 3, 19.99, None),
            item(BilledType::Once, 7, 0.29, None),
        ];
        assert!((calculate_ltv(&contract, &items, now()) - 62.0).abs() < 1e-9);
    }

    #[test]
    fn ltv_is_truncated_not_rounded() {
        let contract = Contract { status: ContractStatus::Live, ..Contract::default() };
        let items = vec![item(BilledType::Once, 1, 10.999, None)];
        assert!((calculate_ltv(&contract, &items, now()) - 10.99).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn one_time_ltv_ignores_duration(
            qty in 0_i64..50,
            cents in 0_i64..100_000,
            days in 0_i64..2000,
        ) {
            #[allow(clippy::cast_precision_loss)]
            let price = cents as f64 / 100.0;
            let contract = Contract {
                status: ContractStatus::Live,
                service_started_at: Some(now() - Duration::days(days)),
                ..Contract::default()
            };
            let started = Some(now() - Duration::days(days));
            let items = vec![item(BilledType::Once, qty, price, started)];
            #[allow(clippy::cast_precision_loss)]
            let expected = (qty * cents) as f64 / 100.0;
            prop_assert!((calculate_ltv(&contract, &items, now()) - expected).abs() < 1e-9);
        }

        #[test]
        fn status_follows_the_rule_table(
            ended in proptest::option::of(-100_i64..100),
            approved: bool,
            started in proptest::option::of(-100_i64..100),
            auto_renew: bool,
            renewed in proptest::option::of(-100_i64..100),
        ) {
            let inputs = StatusInputs {
                ended_at: ended.map(|d| now() + Duration::days(d)),
                approved,
                service_started_at: started.map(|d| now() + Duration::days(d)),
                auto_renew,
                active_renewal_renewed_at: renewed.map(|d| now() + Duration::days(d)),
            };
            let past = |offset: Option<i64>| offset.is_some_and(|d| d < 0);
            let started_yet = started.is_some_and(|d| d <= 0);
            let lapsed = !auto_renew && past(renewed);
            let expected = match (past(ended), approved, started_yet, lapsed) {
                (true, _, _, _) => ContractStatus::Ended,
                (false, false, _, _) => ContractStatus::Draft,
                (false, true, false, _) => ContractStatus::Scheduled,
                (false, true, true, true) => ContractStatus::OutOfContract,
                (false, true, true, false) => ContractStatus::Live,
            };
            prop_assert_eq!(derive_contract_status(&inputs, now()), expected);
        }
    }
}

//! Event payloads, one struct per shape, grouped by aggregate family.
//!
//! Payloads are decoded once per delivery by [`EventPayload::decode`] and
//! handed to handlers as a tagged union, so a handler matches on the variant
//! it registered for instead of re-parsing JSON.
//!
//! All payloads deserialize leniently: missing fields take their default.

use crate::event::EventError;
use crate::event_kind::EventKind;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub mod billing;
pub mod contact;
pub mod contract;
pub mod email;
pub mod invoice;
pub mod issue;
pub mod location;
pub mod log_entry;
pub mod opportunity;
pub mod organization;
pub mod phone_number;
pub mod reminder;
pub mod service_line_item;
pub mod tenant;
pub mod user;

pub use billing::*;
pub use contact::*;
pub use contract::*;
pub use email::*;
pub use invoice::*;
pub use issue::*;
pub use location::*;
pub use log_entry::*;
pub use opportunity::*;
pub use organization::*;
pub use phone_number::*;
pub use reminder::*;
pub use service_line_item::*;
pub use tenant::*;
pub use user::*;

/// Origin of the data carried by an event.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Source {
    /// Data source, e.g. `openline`, `hubspot`
    pub source: String,
    /// Which source wins on conflict
    pub source_of_truth: String,
    /// Application that produced the change
    pub app_source: String,
}

impl Source {
    /// Source of truth, falling back to the source.
    #[must_use]
    pub fn source_of_truth_or_source(&self) -> &str {
        if self.source_of_truth.is_empty() {
            &self.source
        } else {
            &self.source_of_truth
        }
    }
}

/// Link to a record in an external system.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExternalSystem {
    /// External system id, e.g. `hubspot`
    pub external_system_id: String,
    /// Id of the record in the external system
    pub external_id: String,
    /// Secondary id, when the system has one
    pub external_id_second: String,
    /// Deep link to the record
    pub external_url: String,
    /// Source table or object in the external system
    pub external_source: String,
    /// Last sync time
    pub sync_date: Option<DateTime<Utc>>,
}

impl ExternalSystem {
    /// Whether both the system and the record id are present.
    #[must_use]
    pub fn available(&self) -> bool {
        !self.external_system_id.is_empty() && !self.external_id.is_empty()
    }
}

/// Whether an update carrying `mask` should write `field`.
///
/// An empty mask means every field.
#[must_use]
pub fn mask_allows(mask: &[String], field: &str) -> bool {
    mask.is_empty() || mask.iter().any(|f| f == field)
}

/// Payload that only names its tenant.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TenantOnlyEvent {
    /// Tenant
    pub tenant: String,
    /// When the event was raised
    pub updated_at: Option<DateTime<Utc>>,
}

fn json<T: DeserializeOwned>(kind: EventKind, data: &[u8]) -> Result<T, EventError> {
    serde_json::from_slice(data).map_err(|e| EventError::Decode {
        event_type: kind.as_str().to_string(),
        reason: e.to_string(),
    })
}

macro_rules! event_payloads {
    ($( $variant:ident($payload:ty), )*) => {
        /// Decoded payload, one variant per routed [`EventKind`].
        #[derive(Debug, Clone, PartialEq)]
        pub enum EventPayload {
            $(
                #[doc = concat!("Payload of [`EventKind::", stringify!($variant), "`]")]
                $variant($payload),
            )*
            /// Kinds without a typed payload
            Opaque(serde_json::Value),
        }

        impl EventPayload {
            /// Decode `data` into the payload shape of `kind`.
            ///
            /// # Errors
            ///
            /// Returns [`EventError::Decode`] when the JSON does not match.
            pub fn decode(kind: EventKind, data: &[u8]) -> Result<Self, EventError> {
                Ok(match kind {
                    $(EventKind::$variant => Self::$variant(json(kind, data)?),)*
                    _ => Self::Opaque(json(kind, data)?),
                })
            }

            /// Variant name, for error messages.
            #[must_use]
            pub const fn name(&self) -> &'static str {
                match self {
                    $(Self::$variant(_) => stringify!($variant),)*
                    Self::Opaque(_) => "Opaque",
                }
            }
        }
    };
}

event_payloads! {
    PhoneNumberCreate(PhoneNumberCreateEvent),
    PhoneNumberUpdate(PhoneNumberUpdateEvent),
    PhoneNumberValidationFailed(PhoneNumberValidationFailedEvent),
    PhoneNumberValidated(PhoneNumberValidatedEvent),

    EmailValidate(EmailValidateEvent),
    EmailValidatedV2(EmailValidatedV2Event),
    EmailDelete(TenantOnlyEvent),

    ContactPhoneNumberLink(LinkPhoneNumberEvent),
    ContactLocationLink(LinkLocationEvent),

    OrganizationCreate(OrganizationCreateEvent),
    OrganizationUpdate(OrganizationUpdateEvent),
    OrganizationPhoneNumberLink(LinkPhoneNumberEvent),
    OrganizationLocationLink(LinkLocationEvent),
    OrganizationUnlinkDomain(OrganizationUnlinkDomainEvent),
    OrganizationRemoveSocial(OrganizationRemoveSocialEvent),
    OrganizationShow(TenantOnlyEvent),
    OrganizationRefreshArr(TenantOnlyEvent),
    OrganizationRefreshRenewalSummary(TenantOnlyEvent),
    OrganizationRefreshDerivedData(TenantOnlyEvent),
    OrganizationRequestEnrich(OrganizationRequestEnrichEvent),
    OrganizationUpsertCustomField(OrganizationUpsertCustomFieldEvent),
    OrganizationAddParent(OrganizationAddParentEvent),
    OrganizationRemoveParent(OrganizationRemoveParentEvent),
    OrganizationUpdateOnboardingStatus(OrganizationUpdateOnboardingStatusEvent),
    OrganizationCreateBillingProfile(BillingProfileCreateEvent),
    OrganizationUpdateBillingProfile(BillingProfileUpdateEvent),
    OrganizationEmailLinkToBillingProfile(BillingProfileEmailEvent),
    OrganizationEmailUnlinkFromBillingProfile(BillingProfileEmailEvent),
    OrganizationLocationLinkToBillingProfile(BillingProfileLocationEvent),
    OrganizationLocationUnlinkFromBillingProfile(BillingProfileLocationEvent),
    OrganizationAddLocation(OrganizationAddLocationEvent),

    UserCreate(UserCreateEvent),
    UserUpdate(UserUpdateEvent),
    UserPhoneNumberLink(LinkPhoneNumberEvent),
    UserJobRoleLink(UserLinkJobRoleEvent),
    UserAddRole(UserRoleEvent),
    UserRemoveRole(UserRoleEvent),

    LocationCreate(LocationCreateEvent),
    LocationUpdate(LocationUpdateEvent),
    LocationValidationFailed(LocationValidationFailedEvent),
    LocationValidated(LocationValidatedEvent),

    JobRoleCreate(JobRoleCreateEvent),

    LogEntryCreate(LogEntryCreateEvent),
    LogEntryUpdate(LogEntryUpdateEvent),

    CommentCreate(CommentCreateEvent),
    CommentUpdate(CommentUpdateEvent),

    IssueCreate(IssueCreateEvent),
    IssueUpdate(IssueUpdateEvent),
    IssueAddUserAssignee(IssueUserEvent),
    IssueRemoveUserAssignee(IssueUserEvent),
    IssueAddUserFollower(IssueUserEvent),
    IssueRemoveUserFollower(IssueUserEvent),

    OpportunityCreate(OpportunityCreateEvent),
    OpportunityUpdate(OpportunityUpdateEvent),
    OpportunityUpdateNextCycleDate(OpportunityUpdateNextCycleDateEvent),
    OpportunityCreateRenewal(OpportunityCreateRenewalEvent),
    OpportunityUpdateRenewal(OpportunityUpdateRenewalEvent),
    OpportunityCloseLost(OpportunityCloseLostEvent),

    ContractRolloutRenewalOpportunity(TenantOnlyEvent),
    ContractDelete(ContractDeleteEvent),
    ContractRefreshStatus(TenantOnlyEvent),
    ContractRefreshLtv(TenantOnlyEvent),

    ServiceLineItemCreate(ServiceLineItemCreateEvent),
    ServiceLineItemUpdate(ServiceLineItemUpdateEvent),
    ServiceLineItemDelete(TenantOnlyEvent),
    ServiceLineItemClose(ServiceLineItemCloseEvent),
    ServiceLineItemPause(TenantOnlyEvent),
    ServiceLineItemResume(TenantOnlyEvent),

    InvoiceCreateForContract(InvoiceCreateForContractEvent),
    InvoiceFill(InvoiceFillEvent),
    InvoicePdfGenerated(InvoicePdfGeneratedEvent),
    InvoiceVoid(TenantOnlyEvent),
    InvoiceDelete(TenantOnlyEvent),

    TenantAddBillingProfile(TenantBillingProfileCreateEvent),
    TenantUpdateBillingProfile(TenantBillingProfileUpdateEvent),
    TenantUpdateSettings(TenantSettingsUpdateEvent),
    TenantAddBankAccount(BankAccountCreateEvent),
    TenantUpdateBankAccount(BankAccountUpdateEvent),
    TenantDeleteBankAccount(BankAccountDeleteEvent),

    ReminderCreate(ReminderCreateEvent),
    ReminderUpdate(ReminderUpdateEvent),
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn decodes_typed_payload_for_routed_kind() {
        let raw = br#"{"tenant":"acme","website":"https://www.acme.com"}"#;
        let payload = EventPayload::decode(EventKind::OrganizationRequestEnrich, raw).unwrap();
        match payload {
            EventPayload::OrganizationRequestEnrich(e) => {
                assert_eq!(e.tenant, "acme");
                assert_eq!(e.website, "https://www.acme.com");
            }
            other => panic!("unexpected payload {}", other.name()),
        }
    }

    #[test]
    fn unrouted_kind_decodes_as_opaque() {
        let payload =
            EventPayload::decode(EventKind::EventCompleted, br#"{"tenant":"t"}"#).unwrap();
        assert!(matches!(payload, EventPayload::Opaque(_)));
    }

    #[test]
    fn malformed_json_names_the_event_type() {
        let err = EventPayload::decode(EventKind::ContractDelete, b"{").unwrap_err();
        assert!(err.to_string().contains("V1_CONTRACT_DELETE"));
    }

    #[test]
    fn empty_mask_allows_every_field() {
        assert!(mask_allows(&[], "name"));
        let mask = vec!["website".to_string()];
        assert!(mask_allows(&mask, "website"));
        assert!(!mask_allows(&mask, "name"));
    }

    #[test]
    fn external_system_requires_both_ids() {
        let mut ext = ExternalSystem {
            external_system_id: "hubspot".into(),
            ..ExternalSystem::default()
        };
        assert!(!ext.available());
        ext.external_id = "123".into();
        assert!(ext.available());
    }
}

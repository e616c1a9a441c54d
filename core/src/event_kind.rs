//! Closed set of event type strings known to the subscribers.
//!
//! The wire form is `V{n}_{AGGREGATE}_{ACTION}`. Every string a subscriber
//! routes or deliberately ignores has a variant here, so dispatch is a match
//! on [`EventKind`] rather than on raw strings.

use crate::event::AggregateType;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The event type string has no [`EventKind`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown event type: {0}")]
pub struct UnknownEventType(pub String);

macro_rules! event_kinds {
    ($( $variant:ident => $wire:literal, $aggregate:ident; )*) => {
        /// Event type, one variant per known wire string.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum EventKind {
            $(
                #[doc = concat!("`", $wire, "`")]
                $variant,
            )*
        }

        impl EventKind {
            /// Every known kind.
            pub const ALL: &'static [Self] = &[$(Self::$variant,)*];

            /// Wire string.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $wire,)*
                }
            }

            /// Aggregate family whose stream carries this kind.
            #[must_use]
            pub const fn aggregate_type(self) -> AggregateType {
                match self {
                    $(Self::$variant => AggregateType::$aggregate,)*
                }
            }
        }

        impl FromStr for EventKind {
            type Err = UnknownEventType;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($wire => Ok(Self::$variant),)*
                    other => Err(UnknownEventType(other.to_string())),
                }
            }
        }
    };
}

event_kinds! {
    // System
    EventCompleted => "V1_EVENT_COMPLETED", System;

    // Phone number
    PhoneNumberCreate => "V1_PHONE_NUMBER_CREATE", PhoneNumber;
    PhoneNumberUpdate => "V1_PHONE_NUMBER_UPDATE", PhoneNumber;
    PhoneNumberValidate => "V1_PHONE_NUMBER_VALIDATE", PhoneNumber;
    PhoneNumberValidationFailed => "V1_PHONE_NUMBER_VALIDATION_FAILED", PhoneNumber;
    PhoneNumberValidationSkipped => "V1_PHONE_NUMBER_VALIDATION_SKIPPED", PhoneNumber;
    PhoneNumberValidated => "V1_PHONE_NUMBER_VALIDATED", PhoneNumber;

    // Email
    EmailCreate => "V1_EMAIL_CREATE", Email;
    EmailUpdate => "V1_EMAIL_UPDATE", Email;
    EmailUpsert => "V1_EMAIL_UPSERT", Email;
    EmailValidate => "V1_EMAIL_VALIDATE", Email;
    EmailValidationFailed => "V1_EMAIL_VALIDATION_FAILED", Email;
    EmailValidated => "V1_EMAIL_VALIDATED", Email;
    EmailValidatedV2 => "V2_EMAIL_VALIDATED", Email;
    EmailDelete => "V1_EMAIL_DELETE", Email;

    // Contact
    ContactPhoneNumberLink => "V1_CONTACT_PHONE_NUMBER_LINK", Contact;
    ContactLocationLink => "V1_CONTACT_LOCATION_LINK", Contact;

    // Organization
    OrganizationCreate => "V1_ORGANIZATION_CREATE", Organization;
    OrganizationUpdate => "V1_ORGANIZATION_UPDATE", Organization;
    OrganizationPhoneNumberLink => "V1_ORGANIZATION_PHONE_NUMBER_LINK", Organization;
    OrganizationLocationLink => "V1_ORGANIZATION_LOCATION_LINK", Organization;
    OrganizationEmailLink => "V1_ORGANIZATION_EMAIL_LINK", Organization;
    OrganizationEmailUnlink => "V1_ORGANIZATION_EMAIL_UNLINK", Organization;
    OrganizationLinkDomain => "V1_ORGANIZATION_LINK_DOMAIN", Organization;
    OrganizationUnlinkDomain => "V1_ORGANIZATION_UNLINK_DOMAIN", Organization;
    OrganizationAddSocial => "V1_ORGANIZATION_ADD_SOCIAL", Organization;
    OrganizationRemoveSocial => "V1_ORGANIZATION_REMOVE_SOCIAL", Organization;
    OrganizationHide => "V1_ORGANIZATION_HIDE", Organization;
    OrganizationShow => "V1_ORGANIZATION_SHOW", Organization;
    OrganizationAddTag => "V1_ORGANIZATION_ADD_TAG", Organization;
    OrganizationRemoveTag => "V1_ORGANIZATION_REMOVE_TAG", Organization;
    OrganizationRefreshLastTouchpoint => "V1_ORGANIZATION_REFRESH_LAST_TOUCHPOINT", Organization;
    OrganizationRefreshArr => "V1_ORGANIZATION_REFRESH_ARR", Organization;
    OrganizationRefreshRenewalSummary => "V1_ORGANIZATION_REFRESH_RENEWAL_SUMMARY", Organization;
    OrganizationRefreshDerivedData => "V1_ORGANIZATION_REFRESH_DERIVED_DATA", Organization;
    OrganizationRequestRenewalForecast => "V1_ORGANIZATION_RENEWAL_FORECAST_REQUEST", Organization;
    OrganizationRequestNextCycleDate => "V1_ORGANIZATION_NEXT_CYCLE_DATE_REQUEST", Organization;
    OrganizationUpdateRenewalLikelihood => "V1_ORGANIZATION_UPDATE_RENEWAL_LIKELIHOOD", Organization;
    OrganizationUpdateRenewalForecast => "V1_ORGANIZATION_UPDATE_RENEWAL_FORECAST", Organization;
    OrganizationUpdateBillingDetails => "V1_ORGANIZATION_UPDATE_BILLING_DETAILS", Organization;
    OrganizationRequestScrapeByWebsite => "V1_ORGANIZATION_REQUEST_SCRAPE_BY_WEBSITE", Organization;
    OrganizationAdjustIndustry => "V1_ORGANIZATION_ADJUST_INDUSTRY", Organization;
    OrganizationRequestEnrich => "V1_ORGANIZATION_REQUEST_ENRICH", Organization;
    OrganizationUpdateOwner => "V1_ORGANIZATION_UPDATE_OWNER", Organization;
    OrganizationUpdateOwnerNotification => "V1_ORGANIZATION_UPDATE_OWNER_NOTIFICATION", Organization;
    OrganizationUpsertCustomField => "V1_ORGANIZATION_UPSERT_CUSTOM_FIELD", Organization;
    OrganizationAddParent => "V1_ORGANIZATION_ADD_PARENT", Organization;
    OrganizationRemoveParent => "V1_ORGANIZATION_REMOVE_PARENT", Organization;
    OrganizationUpdateOnboardingStatus => "V1_ORGANIZATION_UPDATE_ONBOARDING_STATUS", Organization;
    OrganizationCreateBillingProfile => "V1_ORGANIZATION_CREATE_BILLING_PROFILE", Organization;
    OrganizationUpdateBillingProfile => "V1_ORGANIZATION_UPDATE_BILLING_PROFILE", Organization;
    OrganizationEmailLinkToBillingProfile => "V1_ORGANIZATION_EMAIL_LINK_TO_BILLING_PROFILE", Organization;
    OrganizationEmailUnlinkFromBillingProfile => "V1_ORGANIZATION_EMAIL_UNLINK_FROM_BILLING_PROFILE", Organization;
    OrganizationLocationLinkToBillingProfile => "V1_ORGANIZATION_LOCATION_LINK_TO_BILLING_PROFILE", Organization;
    OrganizationLocationUnlinkFromBillingProfile => "V1_ORGANIZATION_LOCATION_UNLINK_FROM_BILLING_PROFILE", Organization;
    OrganizationAddLocation => "V1_ORGANIZATION_ADD_LOCATION", Organization;

    // User
    UserCreate => "V1_USER_CREATE", User;
    UserUpdate => "V1_USER_UPDATE", User;
    UserPhoneNumberLink => "V1_USER_PHONE_NUMBER_LINK", User;
    UserEmailLink => "V1_USER_EMAIL_LINK", User;
    UserEmailUnlink => "V1_USER_EMAIL_UNLINK", User;
    UserJobRoleLink => "V1_USER_JOB_ROLE_LINK", User;
    UserAddRole => "V1_USER_ADD_ROLE", User;
    UserRemoveRole => "V1_USER_REMOVE_ROLE", User;

    // Location
    LocationCreate => "V1_LOCATION_CREATE", Location;
    LocationUpdate => "V1_LOCATION_UPDATE", Location;
    LocationValidationFailed => "V1_LOCATION_VALIDATION_FAILED", Location;
    LocationValidationSkipped => "V1_LOCATION_VALIDATION_SKIPPED", Location;
    LocationValidated => "V1_LOCATION_VALIDATED", Location;

    // Job role
    JobRoleCreate => "V1_JOB_ROLE_CREATE", JobRole;

    // Log entry
    LogEntryCreate => "V1_LOG_ENTRY_CREATE", LogEntry;
    LogEntryUpdate => "V1_LOG_ENTRY_UPDATE", LogEntry;
    LogEntryAddTag => "V1_LOG_ENTRY_ADD_TAG", LogEntry;
    LogEntryRemoveTag => "V1_LOG_ENTRY_REMOVE_TAG", LogEntry;

    // Comment
    CommentCreate => "V1_COMMENT_CREATE", Comment;
    CommentUpdate => "V1_COMMENT_UPDATE", Comment;

    // Issue
    IssueCreate => "V1_ISSUE_CREATE", Issue;
    IssueUpdate => "V1_ISSUE_UPDATE", Issue;
    IssueAddUserAssignee => "V1_ISSUE_ADD_USER_ASSIGNEE", Issue;
    IssueRemoveUserAssignee => "V1_ISSUE_REMOVE_USER_ASSIGNEE", Issue;
    IssueAddUserFollower => "V1_ISSUE_ADD_USER_FOLLOWER", Issue;
    IssueRemoveUserFollower => "V1_ISSUE_REMOVE_USER_FOLLOWER", Issue;

    // Opportunity
    OpportunityCreate => "V1_OPPORTUNITY_CREATE", Opportunity;
    OpportunityUpdate => "V1_OPPORTUNITY_UPDATE", Opportunity;
    OpportunityUpdateNextCycleDate => "V1_OPPORTUNITY_UPDATE_NEXT_CYCLE_DATE", Opportunity;
    OpportunityCreateRenewal => "V1_OPPORTUNITY_CREATE_RENEWAL", Opportunity;
    OpportunityUpdateRenewal => "V1_OPPORTUNITY_UPDATE_RENEWAL", Opportunity;
    OpportunityCloseLost => "V1_OPPORTUNITY_CLOSE_LOOSE", Opportunity;

    // Contract
    ContractCreate => "V1_CONTRACT_CREATE", Contract;
    ContractUpdate => "V1_CONTRACT_UPDATE", Contract;
    ContractUpdateStatus => "V1_CONTRACT_UPDATE_STATUS", Contract;
    ContractRolloutRenewalOpportunity => "V1_CONTRACT_ROLLOUT_RENEWAL_OPPORTUNITY", Contract;
    ContractDelete => "V1_CONTRACT_DELETE", Contract;
    ContractRefreshStatus => "V1_CONTRACT_REFRESH_STATUS", Contract;
    ContractRefreshLtv => "V1_CONTRACT_REFRESH_LTV", Contract;

    // Service line item
    ServiceLineItemCreate => "V1_SERVICE_LINE_ITEM_CREATE", ServiceLineItem;
    ServiceLineItemUpdate => "V1_SERVICE_LINE_ITEM_UPDATE", ServiceLineItem;
    ServiceLineItemDelete => "V1_SERVICE_LINE_ITEM_DELETE", ServiceLineItem;
    ServiceLineItemClose => "V1_SERVICE_LINE_ITEM_CLOSE", ServiceLineItem;
    ServiceLineItemPause => "V1_SERVICE_LINE_ITEM_PAUSE", ServiceLineItem;
    ServiceLineItemResume => "V1_SERVICE_LINE_ITEM_RESUME", ServiceLineItem;

    // Invoice
    InvoiceCreateForContract => "V1_INVOICE_CREATE_FOR_CONTRACT", Invoice;
    InvoiceFillRequested => "V1_INVOICE_FILL_REQUESTED", Invoice;
    InvoiceFill => "V1_INVOICE_FILL", Invoice;
    InvoiceUpdate => "V1_INVOICE_UPDATE", Invoice;
    InvoicePdfRequested => "V1_INVOICE_PDF_REQUESTED", Invoice;
    InvoicePdfGenerated => "V1_INVOICE_PDF_GENERATED", Invoice;
    InvoicePay => "V1_INVOICE_PAY", Invoice;
    InvoicePaid => "V1_INVOICE_PAID", Invoice;
    InvoicePayNotification => "V1_INVOICE_PAY_NOTIFICATION", Invoice;
    InvoiceRemindNotification => "V1_INVOICE_REMIND_NOTIFICATION", Invoice;
    InvoiceVoid => "V1_INVOICE_VOID", Invoice;
    InvoiceDelete => "V1_INVOICE_DELETE", Invoice;

    // Tenant
    TenantAddBillingProfile => "V1_TENANT_ADD_BILLING_PROFILE", Tenant;
    TenantUpdateBillingProfile => "V1_TENANT_UPDATE_BILLING_PROFILE", Tenant;
    TenantUpdateSettings => "V1_TENANT_UPDATE_SETTINGS", Tenant;
    TenantAddBankAccount => "V1_TENANT_ADD_BANK_ACCOUNT", Tenant;
    TenantUpdateBankAccount => "V1_TENANT_UPDATE_BANK_ACCOUNT", Tenant;
    TenantDeleteBankAccount => "V1_TENANT_DELETE_BANK_ACCOUNT", Tenant;

    // Reminder
    ReminderCreate => "V1_REMINDER_CREATE", Reminder;
    ReminderUpdate => "V1_REMINDER_UPDATE", Reminder;
    ReminderNotification => "V1_REMINDER_NOTIFICATION", Reminder;
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn every_kind_parses_from_its_wire_string() {
        for kind in EventKind::ALL {
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), *kind);
        }
    }

    #[test]
    fn wire_strings_are_unique() {
        let unique: HashSet<_> = EventKind::ALL.iter().map(|k| k.as_str()).collect();
        assert_eq!(unique.len(), EventKind::ALL.len());
    }

    #[test]
    fn unknown_string_is_rejected() {
        let err = "V9_NOPE".parse::<EventKind>().unwrap_err();
        assert_eq!(err, UnknownEventType("V9_NOPE".to_string()));
    }

    #[test]
    fn kinds_know_their_aggregate() {
        assert_eq!(EventKind::EmailValidatedV2.aggregate_type(), AggregateType::Email);
        assert_eq!(EventKind::TenantAddBankAccount.aggregate_type(), AggregateType::Tenant);
        assert_eq!(
            EventKind::ServiceLineItemPause.aggregate_type(),
            AggregateType::ServiceLineItem
        );
    }
}

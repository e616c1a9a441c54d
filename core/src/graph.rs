//! Graph repository port and property model.
//!
//! The read model is a tenant-scoped property graph. Every tenant-owned node
//! carries two labels, the entity label and `{Label}_{tenant}`, and an edge
//! `{LABEL}_BELONGS_TO_TENANT` to its tenant node. Writes are MERGE based:
//! re-applying the same event leaves one node and one edge.
//!
//! Handlers talk to [`GraphRepository`] only; the Neo4j adapter and the
//! in-memory test double both implement it with the same semantics:
//!
//! - [`GraphRepository::merge_node`] creates the node when absent, applies
//!   `on_create` only on creation and `properties` every time.
//! - [`GraphRepository::merge_relationship`] requires both endpoints to exist
//!   and reports whether they did.
//! - Setting a property to [`PropertyValue::Null`] removes it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Graph store errors.
#[derive(Error, Debug, Clone)]
pub enum GraphError {
    /// Could not reach the database
    #[error("Graph connection error: {0}")]
    Connection(String),

    /// Query failed
    #[error("Graph query error: {0}")]
    Query(String),

    /// A row could not be mapped to a node
    #[error("Graph mapping error: {0}")]
    Mapping(String),
}

/// Node labels of the read model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum NodeLabel {
    Tenant,
    TenantSettings,
    TenantBillingProfile,
    BankAccount,
    Organization,
    BillingProfile,
    Contact,
    Contract,
    Email,
    User,
    Opportunity,
    ServiceLineItem,
    Invoice,
    InvoiceLine,
    Comment,
    Issue,
    LogEntry,
    Location,
    JobRole,
    PhoneNumber,
    Reminder,
    Domain,
    Social,
    CustomField,
    Action,
    ExternalSystem,
}

impl NodeLabel {
    /// Label as written to the graph.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tenant => "Tenant",
            Self::TenantSettings => "TenantSettings",
            Self::TenantBillingProfile => "TenantBillingProfile",
            Self::BankAccount => "BankAccount",
            Self::Organization => "Organization",
            Self::BillingProfile => "BillingProfile",
            Self::Contact => "Contact",
            Self::Contract => "Contract",
            Self::Email => "Email",
            Self::User => "User",
            Self::Opportunity => "Opportunity",
            Self::ServiceLineItem => "ServiceLineItem",
            Self::Invoice => "Invoice",
            Self::InvoiceLine => "InvoiceLine",
            Self::Comment => "Comment",
            Self::Issue => "Issue",
            Self::LogEntry => "LogEntry",
            Self::Location => "Location",
            Self::JobRole => "JobRole",
            Self::PhoneNumber => "PhoneNumber",
            Self::Reminder => "Reminder",
            Self::Domain => "Domain",
            Self::Social => "Social",
            Self::CustomField => "CustomField",
            Self::Action => "Action",
            Self::ExternalSystem => "ExternalSystem",
        }
    }

    /// Property the node is keyed by.
    #[must_use]
    pub const fn key_property(self) -> &'static str {
        match self {
            Self::Tenant => "name",
            Self::Domain => "domain",
            _ => "id",
        }
    }

    /// Whether the node carries the `{Label}_{tenant}` label and tenant edge.
    ///
    /// Tenants and domains are shared across tenants.
    #[must_use]
    pub const fn is_tenant_scoped(self) -> bool {
        !matches!(self, Self::Tenant | Self::Domain)
    }

    /// Edge type linking the node to its tenant, e.g. `ORGANIZATION_BELONGS_TO_TENANT`.
    #[must_use]
    pub fn belongs_to_tenant(self) -> String {
        format!("{}_BELONGS_TO_TENANT", upper_snake(self.as_str()))
    }
}

impl fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn upper_snake(camel: &str) -> String {
    let mut out = String::with_capacity(camel.len() + 4);
    for (i, c) in camel.chars().enumerate() {
        if c.is_ascii_uppercase() && i > 0 {
            out.push('_');
        }
        out.push(c.to_ascii_uppercase());
    }
    out
}

/// Edge types of the read model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum RelationshipType {
    Has,
    HasContract,
    HasOpportunity,
    ActiveRenewal,
    HasService,
    HasInvoice,
    HasInvoiceLine,
    Invoiced,
    HasDomain,
    HasProperty,
    AssociatedWith,
    SubsidiaryOf,
    WorksAs,
    Logged,
    CreatedBy,
    Commented,
    AssignedTo,
    FollowedBy,
    ReportedBy,
    SubmittedBy,
    Owns,
    HasBillingProfile,
    HasLocation,
    HasSettings,
    HasBankAccount,
    ActionOn,
    IsLinkedWith,
    ReminderBelongsToUser,
    ReminderBelongsToOrganization,
}

impl RelationshipType {
    /// Edge type as written to the graph.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Has => "HAS",
            Self::HasContract => "HAS_CONTRACT",
            Self::HasOpportunity => "HAS_OPPORTUNITY",
            Self::ActiveRenewal => "ACTIVE_RENEWAL",
            Self::HasService => "HAS_SERVICE",
            Self::HasInvoice => "HAS_INVOICE",
            Self::HasInvoiceLine => "HAS_INVOICE_LINE",
            Self::Invoiced => "INVOICED",
            Self::HasDomain => "HAS_DOMAIN",
            Self::HasProperty => "HAS_PROPERTY",
            Self::AssociatedWith => "ASSOCIATED_WITH",
            Self::SubsidiaryOf => "SUBSIDIARY_OF",
            Self::WorksAs => "WORKS_AS",
            Self::Logged => "LOGGED",
            Self::CreatedBy => "CREATED_BY",
            Self::Commented => "COMMENTED",
            Self::AssignedTo => "ASSIGNED_TO",
            Self::FollowedBy => "FOLLOWED_BY",
            Self::ReportedBy => "REPORTED_BY",
            Self::SubmittedBy => "SUBMITTED_BY",
            Self::Owns => "OWNS",
            Self::HasBillingProfile => "HAS_BILLING_PROFILE",
            Self::HasLocation => "HAS_LOCATION",
            Self::HasSettings => "HAS_SETTINGS",
            Self::HasBankAccount => "HAS_BANK_ACCOUNT",
            Self::ActionOn => "ACTION_ON",
            Self::IsLinkedWith => "IS_LINKED_WITH",
            Self::ReminderBelongsToUser => "REMINDER_BELONGS_TO_USER",
            Self::ReminderBelongsToOrganization => "REMINDER_BELONGS_TO_ORGANIZATION",
        }
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Edge direction seen from the starting node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// `(start)-[r]->(other)`
    Outgoing,
    /// `(start)<-[r]-(other)`
    Incoming,
}

/// A scalar or list property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    DateTime(DateTime<Utc>),
    StringList(Vec<String>),
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<&String> for PropertyValue {
    fn from(v: &String) -> Self {
        Self::String(v.clone())
    }
}

impl From<DateTime<Utc>> for PropertyValue {
    fn from(v: DateTime<Utc>) -> Self {
        Self::DateTime(v)
    }
}

impl From<Vec<String>> for PropertyValue {
    fn from(v: Vec<String>) -> Self {
        Self::StringList(v)
    }
}

impl<T: Into<Self>> From<Option<T>> for PropertyValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Flat property bag of a node or edge.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Properties(BTreeMap<String, PropertyValue>);

impl Properties {
    /// Empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Insert only when `condition` holds.
    #[must_use]
    pub fn with_if(
        self,
        condition: bool,
        key: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Self {
        if condition { self.with(key, value) } else { self }
    }

    /// Insert or replace.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Copy every entry of `other` over this bag; `Null` removes.
    pub fn apply(&mut self, other: &Self) {
        for (k, v) in &other.0 {
            if matches!(v, PropertyValue::Null) {
                self.0.remove(k);
            } else {
                self.0.insert(k.clone(), v.clone());
            }
        }
    }

    /// Raw value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.0.get(key)
    }

    /// String value, if present and a string.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.0.get(key) {
            Some(PropertyValue::String(s)) => Some(s),
            _ => None,
        }
    }

    /// String value or empty.
    #[must_use]
    pub fn string(&self, key: &str) -> String {
        self.get_str(key).unwrap_or_default().to_string()
    }

    /// Boolean value.
    #[must_use]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.0.get(key) {
            Some(PropertyValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// Integer value; floats are truncated.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        match self.0.get(key) {
            Some(PropertyValue::Int(i)) => Some(*i),
            Some(PropertyValue::Float(f)) => Some(*f as i64),
            _ => None,
        }
    }

    /// Float value; integers are widened.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        match self.0.get(key) {
            Some(PropertyValue::Float(f)) => Some(*f),
            Some(PropertyValue::Int(i)) => Some(*i as f64),
            _ => None,
        }
    }

    /// Timestamp value.
    #[must_use]
    pub fn get_datetime(&self, key: &str) -> Option<DateTime<Utc>> {
        match self.0.get(key) {
            Some(PropertyValue::DateTime(d)) => Some(*d),
            _ => None,
        }
    }

    /// List value or empty.
    #[must_use]
    pub fn string_list(&self, key: &str) -> Vec<String> {
        match self.0.get(key) {
            Some(PropertyValue::StringList(l)) => l.clone(),
            _ => Vec::new(),
        }
    }

    /// Whether the bag is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &PropertyValue)> {
        self.0.iter()
    }
}

/// Address of a node: label plus key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef {
    /// Label
    pub label: NodeLabel,
    /// Key value (id, tenant name or domain)
    pub id: String,
}

impl NodeRef {
    /// Create a reference.
    #[must_use]
    pub fn new(label: NodeLabel, id: impl Into<String>) -> Self {
        Self { label, id: id.into() }
    }

    /// The tenant node itself.
    #[must_use]
    pub fn tenant(name: impl Into<String>) -> Self {
        Self::new(NodeLabel::Tenant, name)
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.label, self.id)
    }
}

/// A node read back from the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    /// Label
    pub label: NodeLabel,
    /// Key value
    pub id: String,
    /// Properties, key property included
    pub properties: Properties,
}

impl GraphNode {
    /// Address of this node.
    #[must_use]
    pub fn node_ref(&self) -> NodeRef {
        NodeRef::new(self.label, self.id.clone())
    }
}

/// A neighbour reached over one edge, with the edge's properties.
#[derive(Debug, Clone, PartialEq)]
pub struct Related {
    /// Node at the other end
    pub node: GraphNode,
    /// Edge properties
    pub edge: Properties,
}

/// Tenant-scoped, MERGE-only access to the read model.
#[async_trait]
pub trait GraphRepository: Send + Sync {
    /// Create the node if absent, then apply properties.
    ///
    /// `on_create` is applied only when the node is created; `properties`
    /// is applied every time. Tenant-scoped nodes are linked to their tenant.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError`] if the write fails.
    async fn merge_node(
        &self,
        tenant: &str,
        node: &NodeRef,
        on_create: Properties,
        properties: Properties,
    ) -> Result<(), GraphError>;

    /// Set properties on an existing node. Returns `false` when the node is absent.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError`] if the write fails.
    async fn update_node(
        &self,
        tenant: &str,
        node: &NodeRef,
        properties: Properties,
    ) -> Result<bool, GraphError>;

    /// Remove the node and its edges.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError`] if the write fails.
    async fn delete_node(&self, tenant: &str, node: &NodeRef) -> Result<(), GraphError>;

    /// Read one node.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError`] if the read fails.
    async fn get_node(&self, tenant: &str, node: &NodeRef) -> Result<Option<GraphNode>, GraphError>;

    /// Nodes of `label` whose `property` equals `value`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError`] if the read fails.
    async fn find_nodes(
        &self,
        tenant: &str,
        label: NodeLabel,
        property: &str,
        value: PropertyValue,
    ) -> Result<Vec<GraphNode>, GraphError>;

    /// Merge an edge between two existing nodes and apply its properties.
    /// Returns `false` when either endpoint is absent.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError`] if the write fails.
    async fn merge_relationship(
        &self,
        tenant: &str,
        from: &NodeRef,
        rel: RelationshipType,
        to: &NodeRef,
        properties: Properties,
    ) -> Result<bool, GraphError>;

    /// Remove an edge if present.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError`] if the write fails.
    async fn delete_relationship(
        &self,
        tenant: &str,
        from: &NodeRef,
        rel: RelationshipType,
        to: &NodeRef,
    ) -> Result<(), GraphError>;

    /// Neighbours of `node` with label `target` over edges of type `rel`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError`] if the read fails.
    async fn related(
        &self,
        tenant: &str,
        node: &NodeRef,
        rel: RelationshipType,
        direction: Direction,
        target: NodeLabel,
    ) -> Result<Vec<Related>, GraphError>;
}

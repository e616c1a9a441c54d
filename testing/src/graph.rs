//! In-memory graph repository.
//!
//! Mirrors the MERGE semantics of the Neo4j adapter: tenant-scoped nodes are
//! keyed by tenant, label and id; tenants and domains are shared; edges only
//! form between existing nodes; a `Null` property removes the key.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use async_trait::async_trait;
use crm_projections_core::graph::{
    Direction, GraphError, GraphNode, GraphRepository, NodeLabel, NodeRef, Properties,
    PropertyValue, Related, RelationshipType,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Key {
    scope: String,
    node: NodeRef,
}

impl Key {
    fn new(tenant: &str, node: &NodeRef) -> Self {
        let scope = if node.label.is_tenant_scoped() { tenant.to_string() } else { String::new() };
        Self {
            scope,
            node: node.clone(),
        }
    }
}

type EdgeKey = (Key, RelationshipType, Key);

#[derive(Debug, Default)]
struct State {
    nodes: HashMap<Key, Properties>,
    edges: HashMap<EdgeKey, Properties>,
}

/// HashMap-backed [`GraphRepository`] for tests.
///
/// # Example
///
/// ```
/// use crm_projections_testing::InMemoryGraphRepository;
/// use crm_projections_core::graph::{GraphRepository, NodeLabel, NodeRef, Properties};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let graph = InMemoryGraphRepository::new();
/// let org = NodeRef::new(NodeLabel::Organization, "org-1");
/// graph.merge_node("acme", &org, Properties::new(), Properties::new().with("name", "Acme")).await?;
/// assert_eq!(graph.node("acme", &org).unwrap().string("name"), "Acme");
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryGraphRepository {
    state: Arc<RwLock<State>>,
    fail_writes: Arc<AtomicBool>,
}

impl InMemoryGraphRepository {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with [`GraphError::Query`].
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Insert or replace a node directly, bypassing merge semantics.
    pub fn seed(&self, tenant: &str, node: &NodeRef, properties: Properties) {
        let mut props = properties;
        props.set(node.label.key_property(), node.id.clone());
        self.state.write().unwrap().nodes.insert(Key::new(tenant, node), props);
    }

    /// Insert an edge directly.
    pub fn seed_edge(
        &self,
        tenant: &str,
        from: &NodeRef,
        rel: RelationshipType,
        to: &NodeRef,
        properties: Properties,
    ) {
        self.state
            .write()
            .unwrap()
            .edges
            .insert((Key::new(tenant, from), rel, Key::new(tenant, to)), properties);
    }

    /// Properties of a node.
    #[must_use]
    pub fn node(&self, tenant: &str, node: &NodeRef) -> Option<Properties> {
        self.state.read().unwrap().nodes.get(&Key::new(tenant, node)).cloned()
    }

    /// Properties of an edge.
    #[must_use]
    pub fn edge(
        &self,
        tenant: &str,
        from: &NodeRef,
        rel: RelationshipType,
        to: &NodeRef,
    ) -> Option<Properties> {
        self.state
            .read()
            .unwrap()
            .edges
            .get(&(Key::new(tenant, from), rel, Key::new(tenant, to)))
            .cloned()
    }

    /// Whether an edge exists.
    #[must_use]
    pub fn has_edge(
        &self,
        tenant: &str,
        from: &NodeRef,
        rel: RelationshipType,
        to: &NodeRef,
    ) -> bool {
        self.edge(tenant, from, rel, to).is_some()
    }

    /// Number of nodes with `label` across tenants.
    #[must_use]
    pub fn count(&self, label: NodeLabel) -> usize {
        self.state
            .read()
            .unwrap()
            .nodes
            .keys()
            .filter(|key| key.node.label == label)
            .count()
    }

    fn check_writable(&self) -> Result<(), GraphError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(GraphError::Query("writes disabled".to_string()))
        } else {
            Ok(())
        }
    }

    fn graph_node(key: &Key, properties: &Properties) -> GraphNode {
        GraphNode {
            label: key.node.label,
            id: key.node.id.clone(),
            properties: properties.clone(),
        }
    }
}

#[async_trait]
impl GraphRepository for InMemoryGraphRepository {
    async fn merge_node(
        &self,
        tenant: &str,
        node: &NodeRef,
        on_create: Properties,
        properties: Properties,
    ) -> Result<(), GraphError> {
        self.check_writable()?;
        let mut state = self.state.write().unwrap();
        if node.label.is_tenant_scoped() {
            let tenant_ref = NodeRef::tenant(tenant);
            state
                .nodes
                .entry(Key::new(tenant, &tenant_ref))
                .or_insert_with(|| Properties::new().with("name", tenant));
        }
        let entry = state.nodes.entry(Key::new(tenant, node)).or_insert_with(|| {
            let mut created = Properties::new().with(node.label.key_property(), node.id.clone());
            created.apply(&on_create);
            created
        });
        entry.apply(&properties);
        Ok(())
    }

    async fn update_node(
        &self,
        tenant: &str,
        node: &NodeRef,
        properties: Properties,
    ) -> Result<bool, GraphError> {
        self.check_writable()?;
        let mut state = self.state.write().unwrap();
        match state.nodes.get_mut(&Key::new(tenant, node)) {
            Some(existing) => {
                existing.apply(&properties);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_node(&self, tenant: &str, node: &NodeRef) -> Result<(), GraphError> {
        self.check_writable()?;
        let key = Key::new(tenant, node);
        let mut state = self.state.write().unwrap();
        state.nodes.remove(&key);
        state.edges.retain(|(from, _, to), _| *from != key && *to != key);
        Ok(())
    }

    async fn get_node(
        &self,
        tenant: &str,
        node: &NodeRef,
    ) -> Result<Option<GraphNode>, GraphError> {
        let key = Key::new(tenant, node);
        Ok(self
            .state
            .read()
            .unwrap()
            .nodes
            .get(&key)
            .map(|properties| Self::graph_node(&key, properties)))
    }

    async fn find_nodes(
        &self,
        tenant: &str,
        label: NodeLabel,
        property: &str,
        value: PropertyValue,
    ) -> Result<Vec<GraphNode>, GraphError> {
        let scope = if label.is_tenant_scoped() { tenant } else { "" };
        let state = self.state.read().unwrap();
        let mut found: Vec<GraphNode> = state
            .nodes
            .iter()
            .filter(|(key, props)| {
                key.scope == scope && key.node.label == label && props.get(property) == Some(&value)
            })
            .map(|(key, props)| Self::graph_node(key, props))
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(found)
    }

    async fn merge_relationship(
        &self,
        tenant: &str,
        from: &NodeRef,
        rel: RelationshipType,
        to: &NodeRef,
        properties: Properties,
    ) -> Result<bool, GraphError> {
        self.check_writable()?;
        let from_key = Key::new(tenant, from);
        let to_key = Key::new(tenant, to);
        let mut state = self.state.write().unwrap();
        if !state.nodes.contains_key(&from_key) || !state.nodes.contains_key(&to_key) {
            return Ok(false);
        }
        state
            .edges
            .entry((from_key, rel, to_key))
            .or_default()
            .apply(&properties);
        Ok(true)
    }

    async fn delete_relationship(
        &self,
        tenant: &str,
        from: &NodeRef,
        rel: RelationshipType,
        to: &NodeRef,
    ) -> Result<(), GraphError> {
        self.check_writable()?;
        self.state
            .write()
            .unwrap()
            .edges
            .remove(&(Key::new(tenant, from), rel, Key::new(tenant, to)));
        Ok(())
    }

    async fn related(
        &self,
        tenant: &str,
        node: &NodeRef,
        rel: RelationshipType,
        direction: Direction,
        target: NodeLabel,
    ) -> Result<Vec<Related>, GraphError> {
        let key = Key::new(tenant, node);
        let state = self.state.read().unwrap();
        let mut found: Vec<Related> = state
            .edges
            .iter()
            .filter(|((_, edge_rel, _), _)| *edge_rel == rel)
            .filter_map(|((from, _, to), edge)| {
                let other = match direction {
                    Direction::Outgoing if *from == key => to,
                    Direction::Incoming if *to == key => from,
                    _ => return None,
                };
                if other.node.label != target {
                    return None;
                }
                state.nodes.get(other).map(|props| Related {
                    node: Self::graph_node(other, props),
                    edge: edge.clone(),
                })
            })
            .collect();
        found.sort_by(|a, b| a.node.id.cmp(&b.node.id));
        Ok(found)
    }
}

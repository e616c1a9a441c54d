//! Neo4j implementation of the CRM read-model graph.
//!
//! [`Neo4jGraphRepository`] implements [`GraphRepository`] over a pooled
//! `neo4rs` connection. Each tenant-owned node is written with its entity label,
//! a `{Label}_{tenant}` label and a `{LABEL}_BELONGS_TO_TENANT` edge to the
//! tenant node, all inside one `MERGE` so replays stay idempotent.
//!
//! # Example
//!
//! ```no_run
//! use crm_projections_neo4j::Neo4jGraphRepository;
//!
//! # async fn example() -> Result<(), crm_projections_core::graph::GraphError> {
//! let graph = Neo4jGraphRepository::connect("bolt://localhost:7687", "neo4j", "secret", 16).await?;
//! graph.init_schema().await;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod cypher;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use crm_projections_core::graph::{
    Direction, GraphError, GraphNode, GraphRepository, NodeLabel, NodeRef, Properties,
    PropertyValue, Related, RelationshipType,
};
use neo4rs::{BoltNull, BoltType, ConfigBuilder, Graph, Node, Query, Relation, Row, query};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Graph repository backed by Neo4j.
#[derive(Clone)]
pub struct Neo4jGraphRepository {
    graph: Arc<Graph>,
}

impl std::fmt::Debug for Neo4jGraphRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Neo4jGraphRepository").finish_non_exhaustive()
    }
}

impl Neo4jGraphRepository {
    /// Connect with a pool of at most `max_connections`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Connection`] if the configuration is invalid or
    /// the server cannot be reached.
    pub async fn connect(
        uri: &str,
        user: &str,
        password: &str,
        max_connections: usize,
    ) -> Result<Self, GraphError> {
        let config = ConfigBuilder::default()
            .uri(uri)
            .user(user)
            .password(password)
            .max_connections(max_connections)
            .build()
            .map_err(|e| GraphError::Connection(e.to_string()))?;
        let graph = Graph::connect(config)
            .await
            .map_err(|e| GraphError::Connection(format!("{uri}: {e}")))?;
        tracing::info!(uri, max_connections, "Connected to Neo4j");
        Ok(Self::new(Arc::new(graph)))
    }

    /// Wrap an existing connection pool.
    #[must_use]
    pub const fn new(graph: Arc<Graph>) -> Self {
        Self { graph }
    }

    /// Create constraints and indexes. Failures are logged and skipped.
    pub async fn init_schema(&self) {
        for statement in cypher::schema() {
            if let Err(e) = self.graph.run(query(&statement)).await {
                tracing::warn!(statement, error = %e, "Schema statement skipped");
            }
        }
    }

    async fn run(&self, op: &'static str, q: Query) -> Result<(), GraphError> {
        let started = Instant::now();
        let result = self.graph.run(q).await.map_err(|e| GraphError::Query(format!("{op}: {e}")));
        record(op, started, result.is_ok());
        result
    }

    async fn fetch(&self, op: &'static str, q: Query) -> Result<Vec<Row>, GraphError> {
        let started = Instant::now();
        let result = async {
            let mut stream = self.graph.execute(q).await?;
            let mut rows = Vec::new();
            while let Some(row) = stream.next().await? {
                rows.push(row);
            }
            Ok::<_, neo4rs::Error>(rows)
        }
        .await
        .map_err(|e| GraphError::Query(format!("{op}: {e}")));
        record(op, started, result.is_ok());
        result
    }

    async fn count(&self, op: &'static str, q: Query, column: &str) -> Result<i64, GraphError> {
        let rows = self.fetch(op, q).await?;
        match rows.first() {
            Some(row) => row.get::<i64>(column).map_err(|e| GraphError::Mapping(e.to_string())),
            None => Ok(0),
        }
    }
}

fn record(op: &'static str, started: Instant, ok: bool) {
    metrics::histogram!("projections.graph.query.duration", "op" => op)
        .record(started.elapsed().as_secs_f64());
    if !ok {
        metrics::counter!("projections.graph.query.errors", "op" => op).increment(1);
    }
}

/// Bolt value for a property. `Null` removes the property under `SET +=`.
fn bolt(value: &PropertyValue) -> BoltType {
    match value {
        PropertyValue::Null => BoltType::Null(BoltNull),
        PropertyValue::Bool(b) => BoltType::from(*b),
        PropertyValue::Int(i) => BoltType::from(*i),
        PropertyValue::Float(f) => BoltType::from(*f),
        PropertyValue::String(s) => BoltType::from(s.as_str()),
        PropertyValue::DateTime(d) => BoltType::from(d.fixed_offset()),
        PropertyValue::StringList(list) => BoltType::from(list.clone()),
    }
}

fn bolt_map(properties: &Properties) -> BoltType {
    let map: HashMap<String, BoltType> = properties
        .iter()
        .map(|(k, v)| (k.clone(), bolt(v)))
        .collect();
    BoltType::from(map)
}

/// Read every property of a node or relation back, trying the types the
/// repository writes.
macro_rules! read_properties {
    ($entity:expr) => {{
        let entity = $entity;
        let mut properties = Properties::new();
        for key in entity.keys() {
            let value = entity
                .get::<bool>(key)
                .map(PropertyValue::Bool)
                .or_else(|_| entity.get::<i64>(key).map(PropertyValue::Int))
                .or_else(|_| entity.get::<f64>(key).map(PropertyValue::Float))
                .or_else(|_| entity.get::<String>(key).map(PropertyValue::String))
                .or_else(|_| entity.get::<Vec<String>>(key).map(PropertyValue::StringList))
                .or_else(|_| {
                    entity
                        .get::<DateTime<FixedOffset>>(key)
                        .map(|d| PropertyValue::DateTime(d.with_timezone(&Utc)))
                });
            match value {
                Ok(value) => properties.set(key, value),
                Err(e) => tracing::debug!(key, error = %e, "Skipping property of unsupported type"),
            }
        }
        properties
    }};
}

fn to_graph_node(label: NodeLabel, node: &Node) -> Result<GraphNode, GraphError> {
    let properties = read_properties!(node);
    let id = properties
        .get_str(label.key_property())
        .ok_or_else(|| {
            GraphError::Mapping(format!("{label} node without {}", label.key_property()))
        })?
        .to_string();
    Ok(GraphNode { label, id, properties })
}

fn edge_properties(relation: &Relation) -> Properties {
    read_properties!(relation)
}

fn node_from_row(label: NodeLabel, row: &Row, column: &str) -> Result<GraphNode, GraphError> {
    let node: Node = row.get(column).map_err(|e| GraphError::Mapping(e.to_string()))?;
    to_graph_node(label, &node)
}

#[async_trait]
impl GraphRepository for Neo4jGraphRepository {
    async fn merge_node(
        &self,
        tenant: &str,
        node: &NodeRef,
        on_create: Properties,
        properties: Properties,
    ) -> Result<(), GraphError> {
        let q = query(&cypher::merge_node(node, tenant))
            .param("tenant", tenant)
            .param("id", node.id.as_str())
            .param("onCreate", bolt_map(&on_create))
            .param("props", bolt_map(&properties));
        self.run("merge_node", q).await
    }

    async fn update_node(
        &self,
        tenant: &str,
        node: &NodeRef,
        properties: Properties,
    ) -> Result<bool, GraphError> {
        let q = query(&cypher::update_node(node, tenant))
            .param("id", node.id.as_str())
            .param("props", bolt_map(&properties));
        Ok(self.count("update_node", q, "found").await? > 0)
    }

    async fn delete_node(&self, tenant: &str, node: &NodeRef) -> Result<(), GraphError> {
        let q = query(&cypher::delete_node(node, tenant)).param("id", node.id.as_str());
        self.run("delete_node", q).await
    }

    async fn get_node(
        &self,
        tenant: &str,
        node: &NodeRef,
    ) -> Result<Option<GraphNode>, GraphError> {
        let q = query(&cypher::get_node(node, tenant)).param("id", node.id.as_str());
        let rows = self.fetch("get_node", q).await?;
        rows.first().map(|row| node_from_row(node.label, row, "n")).transpose()
    }

    async fn find_nodes(
        &self,
        tenant: &str,
        label: NodeLabel,
        property: &str,
        value: PropertyValue,
    ) -> Result<Vec<GraphNode>, GraphError> {
        let q = query(&cypher::find_nodes(label, tenant))
            .param("property", property)
            .param("value", bolt(&value));
        let rows = self.fetch("find_nodes", q).await?;
        rows.iter().map(|row| node_from_row(label, row, "n")).collect()
    }

    async fn merge_relationship(
        &self,
        tenant: &str,
        from: &NodeRef,
        rel: RelationshipType,
        to: &NodeRef,
        properties: Properties,
    ) -> Result<bool, GraphError> {
        let q = query(&cypher::merge_relationship(from, rel, to, tenant))
            .param("from", from.id.as_str())
            .param("to", to.id.as_str())
            .param("props", bolt_map(&properties));
        let merged = self.count("merge_relationship", q, "merged").await? > 0;
        if !merged {
            tracing::debug!(
                tenant,
                %from,
                %to,
                rel = rel.as_str(),
                "Relationship endpoint missing"
            );
        }
        Ok(merged)
    }

    async fn delete_relationship(
        &self,
        tenant: &str,
        from: &NodeRef,
        rel: RelationshipType,
        to: &NodeRef,
    ) -> Result<(), GraphError> {
        let q = query(&cypher::delete_relationship(from, rel, to, tenant))
            .param("from", from.id.as_str())
            .param("to", to.id.as_str());
        self.run("delete_relationship", q).await
    }

    async fn related(
        &self,
        tenant: &str,
        node: &NodeRef,
        rel: RelationshipType,
        direction: Direction,
        target: NodeLabel,
    ) -> Result<Vec<Related>, GraphError> {
        let q = query(&cypher::related(node, rel, direction, target, tenant))
            .param("id", node.id.as_str());
        let rows = self.fetch("related", q).await?;
        rows.iter()
            .map(|row| {
                let relation: Relation = row
                    .get("r")
                    .map_err(|e| GraphError::Mapping(e.to_string()))?;
                Ok(Related {
                    node: node_from_row(target, row, "b")?,
                    edge: edge_properties(&relation),
                })
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn null_properties_become_bolt_null() {
        assert!(matches!(bolt(&PropertyValue::Null), BoltType::Null(_)));
        assert!(matches!(bolt(&PropertyValue::from("x")), BoltType::String(_)));
        assert!(matches!(bolt(&PropertyValue::Int(3)), BoltType::Integer(_)));
        assert!(matches!(
            bolt(&PropertyValue::StringList(vec!["a".into()])),
            BoltType::List(_)
        ));
    }

    #[test]
    fn property_bags_become_bolt_maps() {
        let props = Properties::new().with("name", "Acme").with("hide", false);
        match bolt_map(&props) {
            BoltType::Map(map) => assert_eq!(map.value.len(), 2),
            other => panic!("expected a map, got {other:?}"),
        }
    }

    #[test]
    fn repository_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Neo4jGraphRepository>();
    }
}

//! Integration tests for the Neo4j repository against a real server.
//!
//! Marked `#[ignore]`; they need Docker:
//!
//! ```bash
//! cargo test -p crm-projections-neo4j --test integration_tests -- --ignored
//! ```

#![allow(clippy::expect_used)]

use crm_projections_core::graph::{
    Direction, GraphRepository, NodeLabel, NodeRef, Properties, PropertyValue, RelationshipType,
};
use crm_projections_neo4j::Neo4jGraphRepository;
use testcontainers::ContainerAsync;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::neo4j::{Neo4j, Neo4jImage};

async fn start() -> (ContainerAsync<Neo4jImage>, Neo4jGraphRepository) {
    let container = Neo4j::default().start().await.expect("Failed to start Neo4j container");
    let host = container.get_host().await.expect("host");
    let port = container.get_host_port_ipv4(7687).await.expect("bolt port");
    let uri = format!("bolt://{host}:{port}");
    let user = container.image().user().expect("user").to_string();
    let password = container.image().password().expect("password").to_string();
    let graph = Neo4jGraphRepository::connect(&uri, &user, &password, 4)
        .await
        .expect("connect");
    graph.init_schema().await;
    (container, graph)
}

fn org(id: &str) -> NodeRef {
    NodeRef::new(NodeLabel::Organization, id)
}

#[tokio::test]
#[ignore]
async fn merge_is_idempotent_and_on_create_applies_once() {
    let (_container, graph) = start().await;
    let created = Properties::new().with("createdAt", "2024-01-01T00:00:00Z");

    graph
        .merge_node("acme", &org("o1"), created.clone(), Properties::new().with("name", "Acme"))
        .await
        .expect("first merge");
    graph
        .merge_node(
            "acme",
            &org("o1"),
            Properties::new().with("createdAt", "later"),
            Properties::new().with("name", "Acme Inc").with("employees", 12_i64),
        )
        .await
        .expect("second merge");

    let node = graph.get_node("acme", &org("o1")).await.expect("read").expect("node");
    assert_eq!(node.properties.get_str("name"), Some("Acme Inc"));
    assert_eq!(node.properties.get_str("createdAt"), Some("2024-01-01T00:00:00Z"));
    assert_eq!(node.properties.get_i64("employees"), Some(12));

    let found = graph
        .find_nodes("acme", NodeLabel::Organization, "name", PropertyValue::from("Acme Inc"))
        .await
        .expect("find");
    assert_eq!(found.len(), 1);
}

#[tokio::test]
#[ignore]
async fn tenants_do_not_see_each_other() {
    let (_container, graph) = start().await;
    graph
        .merge_node("acme", &org("o1"), Properties::new(), Properties::new().with("name", "Acme"))
        .await
        .expect("merge");

    assert!(graph.get_node("globex", &org("o1")).await.expect("read").is_none());
    assert!(graph.get_node("acme", &NodeRef::tenant("acme")).await.expect("read").is_some());
}

#[tokio::test]
#[ignore]
async fn relationships_need_both_ends() {
    let (_container, graph) = start().await;
    let contract = NodeRef::new(NodeLabel::Contract, "c1");
    graph
        .merge_node("acme", &org("o1"), Properties::new(), Properties::new())
        .await
        .expect("org");

    let linked = graph
        .merge_relationship(
            "acme",
            &org("o1"),
            RelationshipType::HasContract,
            &contract,
            Properties::new(),
        )
        .await
        .expect("link");
    assert!(!linked);

    graph
        .merge_node("acme", &contract, Properties::new(), Properties::new().with("name", "Annual"))
        .await
        .expect("contract");
    let linked = graph
        .merge_relationship(
            "acme",
            &org("o1"),
            RelationshipType::HasContract,
            &contract,
            Properties::new().with("source", "openline"),
        )
        .await
        .expect("link");
    assert!(linked);

    let owners = graph
        .related(
            "acme",
            &contract,
            RelationshipType::HasContract,
            Direction::Incoming,
            NodeLabel::Organization,
        )
        .await
        .expect("related");
    assert_eq!(owners.len(), 1);
    assert_eq!(owners[0].node.id, "o1");
    assert_eq!(owners[0].edge.get_str("source"), Some("openline"));

    graph
        .delete_relationship("acme", &org("o1"), RelationshipType::HasContract, &contract)
        .await
        .expect("unlink");
    let owners = graph
        .related(
            "acme",
            &contract,
            RelationshipType::HasContract,
            Direction::Incoming,
            NodeLabel::Organization,
        )
        .await
        .expect("related");
    assert!(owners.is_empty());
}

#[tokio::test]
#[ignore]
async fn null_removes_and_update_reports_absence() {
    let (_container, graph) = start().await;
    graph
        .merge_node(
            "acme",
            &org("o1"),
            Properties::new(),
            Properties::new().with("website", "acme.com"),
        )
        .await
        .expect("merge");

    let updated = graph
        .update_node("acme", &org("o1"), Properties::new().with("website", PropertyValue::Null))
        .await
        .expect("update");
    assert!(updated);
    let node = graph.get_node("acme", &org("o1")).await.expect("read").expect("node");
    assert!(node.properties.get("website").is_none());

    let updated = graph
        .update_node("acme", &org("missing"), Properties::new().with("name", "x"))
        .await
        .expect("update");
    assert!(!updated);

    graph.delete_node("acme", &org("o1")).await.expect("delete");
    assert!(graph.get_node("acme", &org("o1")).await.expect("read").is_none());
}

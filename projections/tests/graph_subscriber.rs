//! Graph subscriber driven end to end over a scripted subscription group.

#![allow(clippy::unwrap_used)]

use crm_projections_core::command::CommandClient;
use crm_projections_core::event_kind::EventKind;
use crm_projections_core::graph::{NodeLabel, NodeRef};
use crm_projections_subscribers::{GraphContext, ProjectionsConfig, graph_subscriber};
use crm_projections_testing::{
    InMemoryGraphRepository, RecordingCommandClient, RecordingNotifier, ScriptedBroker, builders,
    test_clock,
};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::watch;

struct Fixture {
    broker: ScriptedBroker,
    graph: InMemoryGraphRepository,
    notifier: RecordingNotifier,
    shutdown: watch::Sender<bool>,
    running: tokio::task::JoinHandle<()>,
}

fn start() -> Fixture {
    let broker = ScriptedBroker::new("events");
    let graph = InMemoryGraphRepository::new();
    let notifier = RecordingNotifier::new();
    let commands: Arc<dyn CommandClient> = Arc::new(RecordingCommandClient::new());
    let ctx = GraphContext::new(
        Arc::new(graph.clone()),
        commands,
        Arc::new(notifier.clone()),
        Arc::new(test_clock()),
    );
    // One connection keeps deliveries in publish order.
    let config = ProjectionsConfig::from_lookup(|key| match key {
        "NEO4J_PASSWORD" => Some("secret".to_string()),
        "GRAPH_POOL_SIZE" => Some("1".to_string()),
        _ => None,
    })
    .unwrap();
    let subscriber = graph_subscriber(&config, &ctx, Arc::new(broker.clone()));

    let (shutdown, shutdown_rx) = watch::channel(false);
    let running = tokio::spawn(async move {
        subscriber.run(shutdown_rx).await.unwrap();
    });
    Fixture {
        broker,
        graph,
        notifier,
        shutdown,
        running,
    }
}

impl Fixture {
    async fn stop(self) {
        self.shutdown.send(true).unwrap();
        self.running.await.unwrap();
    }
}

#[tokio::test]
async fn organization_is_projected_and_acked() {
    let f = start();

    let receipt = f.broker.publish(builders::event(
        EventKind::OrganizationCreate,
        "acme",
        "o1",
        json!({"name": "Acme", "website": "acme.com"}),
    ));
    assert!(f.broker.wait_for_acks(1).await);

    assert_eq!(f.broker.acked(), vec![receipt]);
    assert!(f.broker.parked().is_empty());
    let node = f.graph.node("acme", &NodeRef::new(NodeLabel::Organization, "o1")).unwrap();
    assert_eq!(node.get_str("name"), Some("Acme"));
    let notified = f.notifier.notified();
    assert_eq!(notified.len(), 1);
    assert_eq!(notified[0].entity_id, "o1");
    f.stop().await;
}

#[tokio::test]
async fn ignored_kinds_are_acked_without_writes() {
    let f = start();

    f.broker.publish(builders::bare_event(EventKind::OrganizationHide, "acme", "o1"));
    f.broker.publish(builders::bare_event(EventKind::EmailValidate, "acme", "e1"));
    assert!(f.broker.wait_for_acks(2).await);

    assert!(f.broker.parked().is_empty());
    assert!(f.graph.node("acme", &NodeRef::new(NodeLabel::Organization, "o1")).is_none());
    assert!(f.notifier.notified().is_empty());
    f.stop().await;
}

#[tokio::test]
async fn unknown_event_type_is_parked_then_acked() {
    let f = start();

    let receipt = f.broker.publish(builders::raw_event(
        "organization-acme-o1",
        "V1_ORGANIZATION_TELEPORT",
        json!({"tenant": "acme"}),
    ));
    assert!(f.broker.wait_for_acks(1).await);

    let parked = f.broker.parked();
    assert_eq!(parked.len(), 1);
    assert_eq!(parked[0].0, receipt);
    assert!(parked[0].1.contains("V1_ORGANIZATION_TELEPORT"));
    assert_eq!(f.broker.acked(), vec![receipt]);
    f.stop().await;
}

#[tokio::test]
async fn later_events_build_on_earlier_ones() {
    let f = start();

    f.broker.publish(builders::event(
        EventKind::OrganizationCreate,
        "acme",
        "o1",
        json!({"name": "Acme"}),
    ));
    f.broker.publish(builders::event(
        EventKind::OrganizationUpdate,
        "acme",
        "o1",
        json!({"name": "Acme Inc", "fieldsMask": ["name"]}),
    ));
    assert!(f.broker.wait_for_acks(2).await);

    let node = f.graph.node("acme", &NodeRef::new(NodeLabel::Organization, "o1")).unwrap();
    assert_eq!(node.get_str("name"), Some("Acme Inc"));
    f.stop().await;
}

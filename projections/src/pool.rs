//! Persistent subscription worker pool.
//!
//! A [`WorkerPool`] joins one subscription group with `pool_size` connections
//! and runs one worker task per connection. Every delivery ends in exactly one
//! of three ways:
//!
//! - dispatched successfully, then acknowledged
//! - dispatch failed, so the delivery is parked with the error text and then
//!   acknowledged (unless [`AckMode::ParkOnly`])
//! - the subscription dropped, so the worker fails and the pool stops
//!
//! A failed ack or park is fatal for the worker. The first worker failure
//! stops its siblings: workers waiting in `recv` leave at once, a worker in the
//! middle of a handler finishes that event first.

use crate::config::AckMode;
use crate::dispatcher::EventDispatcher;
use crm_projections_core::subscription::{
    Delivery, ParkedEvent, ParkedEventLog, PersistentSubscription, SubscriptionConnector,
    SubscriptionError, SubscriptionMessage,
};
use crm_projections_runtime::metrics::ProjectionMetrics;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinSet;

/// Pool failures.
#[derive(Error, Debug)]
pub enum PoolError {
    /// A worker's subscription failed
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),

    /// A worker task panicked or was cancelled
    #[error("Worker task failed: {0}")]
    Worker(String),
}

/// Workers of one subscription group.
#[derive(Clone)]
pub struct WorkerPool {
    pool_size: usize,
    connector: Arc<dyn SubscriptionConnector>,
    dispatcher: Arc<EventDispatcher>,
    ack_mode: AckMode,
    parked_log: Option<Arc<dyn ParkedEventLog>>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("group", &self.dispatcher.group())
            .field("pool_size", &self.pool_size)
            .field("ack_mode", &self.ack_mode)
            .field("parked_log", &self.parked_log.is_some())
            .finish_non_exhaustive()
    }
}

impl WorkerPool {
    /// Pool of `pool_size` workers feeding `dispatcher`.
    #[must_use]
    pub fn new(
        pool_size: usize,
        connector: Arc<dyn SubscriptionConnector>,
        dispatcher: Arc<EventDispatcher>,
    ) -> Self {
        Self {
            pool_size,
            connector,
            dispatcher,
            ack_mode: AckMode::default(),
            parked_log: None,
        }
    }

    /// Set what happens after a park.
    #[must_use]
    pub const fn with_ack_mode(mut self, ack_mode: AckMode) -> Self {
        self.ack_mode = ack_mode;
        self
    }

    /// Also record parked deliveries in `log`.
    #[must_use]
    pub fn with_parked_log(mut self, log: Arc<dyn ParkedEventLog>) -> Self {
        self.parked_log = Some(log);
        self
    }

    /// Run every worker until `shutdown` turns `true` or a worker fails.
    ///
    /// Dropping the shutdown sender counts as a shutdown request.
    ///
    /// # Errors
    ///
    /// Returns the first worker failure, after the remaining workers stopped.
    pub async fn connect(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), PoolError> {
        let group = self.dispatcher.group().to_string();
        tracing::info!(group = %group, pool_size = self.pool_size, "Starting subscription workers");

        let (stop_tx, stop_rx) = watch::channel(false);
        let mut workers = JoinSet::new();
        for worker_id in 1..=self.pool_size {
            let worker = Worker {
                id: worker_id,
                group: group.clone(),
                pool: self.clone(),
            };
            workers.spawn(worker.run(stop_rx.clone()));
        }

        let mut stopping = *shutdown.borrow();
        if stopping {
            let _ = stop_tx.send(true);
        }

        let mut first_error: Option<PoolError> = None;
        loop {
            tokio::select! {
                joined = workers.join_next() => {
                    let Some(joined) = joined else {
                        break;
                    };
                    let result = joined.unwrap_or_else(|e| Err(PoolError::Worker(e.to_string())));
                    if let Err(err) = result {
                        tracing::error!(group = %group, error = %err, "Subscription worker failed");
                        if first_error.is_none() {
                            stopping = true;
                            let _ = stop_tx.send(true);
                            first_error = Some(err);
                        }
                    }
                }
                changed = shutdown.changed(), if !stopping => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!(group = %group, "Shutdown signal received");
                        stopping = true;
                        let _ = stop_tx.send(true);
                    }
                }
            }
        }

        tracing::info!(group = %group, "Subscription workers stopped");
        first_error.map_or(Ok(()), Err)
    }
}

struct Worker {
    id: usize,
    group: String,
    pool: WorkerPool,
}

impl Worker {
    async fn run(self, mut stop: watch::Receiver<bool>) -> Result<(), PoolError> {
        let subscription = self.pool.connector.connect(&self.group, self.id).await?;
        tracing::info!(group = %self.group, worker = self.id, "Worker connected");

        loop {
            if *stop.borrow() {
                tracing::debug!(group = %self.group, worker = self.id, "Worker stopping");
                return Ok(());
            }

            let message = tokio::select! {
                message = subscription.recv() => message,
                changed = stop.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                    continue;
                }
            };

            match message {
                SubscriptionMessage::Dropped { reason } => {
                    tracing::error!(
                        group = %self.group,
                        worker = self.id,
                        reason = %reason,
                        "Subscription dropped"
                    );
                    return Err(SubscriptionError::Dropped { reason }.into());
                }
                SubscriptionMessage::EventAppeared(delivery) => {
                    self.process(subscription.as_ref(), &delivery).await?;
                }
            }
        }
    }

    async fn process(
        &self,
        subscription: &dyn PersistentSubscription,
        delivery: &Delivery,
    ) -> Result<(), PoolError> {
        ProjectionMetrics::record_received(&self.group);

        let Some(event) = delivery.event.as_ref() else {
            tracing::warn!(
                group = %self.group,
                worker = self.id,
                offset = delivery.receipt.offset,
                "Delivery without an event, acknowledging"
            );
            subscription.ack(delivery).await?;
            return Ok(());
        };

        tracing::debug!(
            group = %self.group,
            worker = self.id,
            event_type = %event.event_type,
            aggregate_id = %event.aggregate_id,
            "Event appeared"
        );

        if let Err(err) = self.pool.dispatcher.when(event).await {
            let reason = err.to_string();
            tracing::error!(
                group = %self.group,
                worker = self.id,
                event_type = %event.event_type,
                error = %reason,
                "Parking event"
            );
            subscription.park(delivery, &reason).await?;
            ProjectionMetrics::record_parked(&self.group, &event.event_type);

            if let Some(log) = &self.pool.parked_log {
                let parked = ParkedEvent::from_delivery(&self.group, delivery, &reason);
                if let Err(e) = log.record(parked).await {
                    tracing::warn!(
                        group = %self.group,
                        error = %e,
                        "Failed to record parked event"
                    );
                }
            }

            if self.pool.ack_mode == AckMode::ParkOnly {
                return Ok(());
            }
        }

        subscription.ack(delivery).await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crm_projections_core::event_kind::EventKind;
    use crm_projections_core::handler::{
        DecodedEvent, FailurePolicy, Handler, HandlerError, HandlerRegistry,
    };
    use crm_projections_testing::{ScriptedBroker, builders};
    use std::sync::Mutex;

    struct FailOn(EventKind);

    #[async_trait]
    impl Handler for FailOn {
        fn name(&self) -> &'static str {
            "fail_on"
        }

        async fn handle(&self, event: &DecodedEvent) -> Result<(), HandlerError> {
            if event.kind == self.0 {
                return Err(HandlerError::Other("projection failed".to_string()));
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemoryLog(Mutex<Vec<ParkedEvent>>);

    #[async_trait]
    impl ParkedEventLog for MemoryLog {
        async fn record(&self, parked: ParkedEvent) -> Result<(), SubscriptionError> {
            self.0.lock().unwrap().push(parked);
            Ok(())
        }
    }

    fn pool(broker: &ScriptedBroker, pool_size: usize) -> WorkerPool {
        let registry = HandlerRegistry::new().register(
            &[EventKind::UserCreate, EventKind::UserUpdate],
            Arc::new(FailOn(EventKind::UserUpdate)),
            FailurePolicy::Parked,
        );
        let dispatcher = Arc::new(EventDispatcher::new("graph-v1", registry));
        WorkerPool::new(pool_size, Arc::new(broker.clone()), dispatcher)
    }

    fn user_event(kind: EventKind) -> crm_projections_core::event::StoredEvent {
        builders::event(kind, "acme", "u1", serde_json::json!({"name": "Ada"}))
    }

    #[tokio::test]
    async fn handled_events_are_acked_and_shutdown_is_clean() {
        let broker = ScriptedBroker::new("events");
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let pool = pool(&broker, 3);
        let running = tokio::spawn(async move { pool.connect(shutdown_rx).await });

        for _ in 0..5 {
            broker.publish(user_event(EventKind::UserCreate));
        }
        assert!(broker.wait_for_acks(5).await);
        assert!(broker.parked().is_empty());

        shutdown_tx.send(true).unwrap();
        running.await.unwrap().unwrap();
        assert_eq!(broker.connections(), 3);
    }

    #[tokio::test]
    async fn failed_event_is_parked_then_acked() {
        let broker = ScriptedBroker::new("events");
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let pool = pool(&broker, 1);
        let running = tokio::spawn(async move { pool.connect(shutdown_rx).await });

        let receipt = broker.publish(user_event(EventKind::UserUpdate));
        assert!(broker.wait_for_acks(1).await);

        let parked = broker.parked();
        assert_eq!(parked.len(), 1);
        assert_eq!(parked[0].0, receipt);
        assert!(parked[0].1.contains("projection failed"));
        assert_eq!(broker.acked(), vec![receipt]);

        shutdown_tx.send(true).unwrap();
        running.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn park_only_mode_skips_the_ack() {
        let broker = ScriptedBroker::new("events");
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let pool = pool(&broker, 1).with_ack_mode(AckMode::ParkOnly);
        let running = tokio::spawn(async move { pool.connect(shutdown_rx).await });

        broker.publish(user_event(EventKind::UserUpdate));
        broker.publish(user_event(EventKind::UserCreate));
        assert!(broker.wait_for_acks(1).await);

        assert_eq!(broker.parked().len(), 1);
        assert_eq!(broker.acked().len(), 1);
        assert_eq!(broker.acked()[0].offset, 1);

        shutdown_tx.send(true).unwrap();
        running.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn parked_events_are_recorded_in_the_log() {
        let broker = ScriptedBroker::new("events");
        let log = Arc::new(MemoryLog::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let pool = pool(&broker, 1).with_parked_log(Arc::clone(&log) as Arc<dyn ParkedEventLog>);
        let running = tokio::spawn(async move { pool.connect(shutdown_rx).await });

        broker.publish(user_event(EventKind::UserUpdate));
        assert!(broker.wait_for_acks(1).await);

        let recorded = log.0.lock().unwrap().clone();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].group, "graph-v1");
        assert_eq!(recorded[0].event_type.as_deref(), Some("V1_USER_UPDATE"));
        assert_eq!(recorded[0].tenant.as_deref(), Some("acme"));

        shutdown_tx.send(true).unwrap();
        running.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn delivery_without_event_is_acked() {
        let broker = ScriptedBroker::new("events");
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let pool = pool(&broker, 1);
        let running = tokio::spawn(async move { pool.connect(shutdown_rx).await });

        broker.publish_empty(b"not an event");
        assert!(broker.wait_for_acks(1).await);
        assert!(broker.parked().is_empty());

        shutdown_tx.send(true).unwrap();
        running.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn dropped_subscription_stops_every_worker() {
        let broker = ScriptedBroker::new("events");
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let pool = pool(&broker, 4);

        broker.drop_subscription("connection reset");
        let err = pool.connect(shutdown_rx).await.unwrap_err();

        match err {
            PoolError::Subscription(SubscriptionError::Dropped { reason }) => {
                assert_eq!(reason, "connection reset")
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn connect_failure_is_returned() {
        let broker = ScriptedBroker::new("events");
        broker.fail_connect(true);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let err = pool(&broker, 2).connect(shutdown_rx).await.unwrap_err();

        assert!(matches!(err, PoolError::Subscription(SubscriptionError::Connect { .. })));
    }

    #[tokio::test]
    async fn ack_failure_is_fatal() {
        let broker = ScriptedBroker::new("events");
        broker.fail_ack(true);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        broker.publish(user_event(EventKind::UserCreate));
        let err = pool(&broker, 2).connect(shutdown_rx).await.unwrap_err();

        assert!(matches!(err, PoolError::Subscription(SubscriptionError::Ack(_))));
    }

    #[tokio::test]
    async fn park_failure_is_fatal() {
        let broker = ScriptedBroker::new("events");
        broker.fail_park(true);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        broker.publish(user_event(EventKind::UserUpdate));
        let err = pool(&broker, 1).connect(shutdown_rx).await.unwrap_err();

        assert!(matches!(err, PoolError::Subscription(SubscriptionError::Park(_))));
        assert!(broker.acked().is_empty());
    }
}

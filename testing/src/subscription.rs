//! Scripted persistent subscription.
//!
//! A [`ScriptedBroker`] is a [`SubscriptionConnector`] whose connections all
//! compete for one in-memory queue, like consumers of one subscription group.
//! Tests publish deliveries, run the worker pool, then inspect what was
//! acknowledged and parked.

#![allow(clippy::unwrap_used)]
#![allow(clippy::missing_panics_doc)]

use crm_projections_core::event::StoredEvent;
use crm_projections_core::subscription::{
    ConnectFuture, Delivery, PersistentSubscription, Receipt, SubscriptionConnector,
    SubscriptionError, SubscriptionMessage,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug)]
struct Inner {
    sender: Mutex<Option<mpsc::UnboundedSender<SubscriptionMessage>>>,
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<SubscriptionMessage>>,
    next_offset: AtomicI64,
    acked: Mutex<Vec<Receipt>>,
    parked: Mutex<Vec<(Receipt, String)>>,
    connections: AtomicUsize,
    fail_connect: AtomicBool,
    fail_ack: AtomicBool,
    fail_park: AtomicBool,
}

/// In-memory subscription group.
#[derive(Debug, Clone)]
pub struct ScriptedBroker {
    stream: String,
    inner: Arc<Inner>,
}

impl ScriptedBroker {
    /// Empty broker for `stream`.
    #[must_use]
    pub fn new(stream: &str) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            stream: stream.to_string(),
            inner: Arc::new(Inner {
                sender: Mutex::new(Some(sender)),
                receiver: tokio::sync::Mutex::new(receiver),
                next_offset: AtomicI64::new(0),
                acked: Mutex::new(Vec::new()),
                parked: Mutex::new(Vec::new()),
                connections: AtomicUsize::new(0),
                fail_connect: AtomicBool::new(false),
                fail_ack: AtomicBool::new(false),
                fail_park: AtomicBool::new(false),
            }),
        }
    }

    fn send(&self, message: SubscriptionMessage) {
        if let Some(sender) = self.inner.sender.lock().unwrap().as_ref() {
            let _ = sender.send(message);
        }
    }

    fn next_receipt(&self) -> Receipt {
        Receipt {
            stream: self.stream.clone(),
            partition: 0,
            offset: self.inner.next_offset.fetch_add(1, Ordering::SeqCst),
        }
    }

    /// Deliver an event. Returns its receipt.
    pub fn publish(&self, event: StoredEvent) -> Receipt {
        let receipt = self.next_receipt();
        let payload = serde_json::to_vec(&event).unwrap_or_default();
        self.send(SubscriptionMessage::EventAppeared(Delivery {
            receipt: receipt.clone(),
            event: Some(event),
            payload,
        }));
        receipt
    }

    /// Deliver a message that carries no usable event.
    pub fn publish_empty(&self, payload: &[u8]) -> Receipt {
        let receipt = self.next_receipt();
        self.send(SubscriptionMessage::EventAppeared(Delivery {
            receipt: receipt.clone(),
            event: None,
            payload: payload.to_vec(),
        }));
        receipt
    }

    /// Tell one connection the subscription was dropped.
    pub fn drop_subscription(&self, reason: &str) {
        self.send(SubscriptionMessage::Dropped {
            reason: reason.to_string(),
        });
    }

    /// Close the queue. Connections report `Dropped` once it drains.
    pub fn close(&self) {
        self.inner.sender.lock().unwrap().take();
    }

    /// Refuse new connections.
    pub fn fail_connect(&self, fail: bool) {
        self.inner.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Fail every acknowledgement.
    pub fn fail_ack(&self, fail: bool) {
        self.inner.fail_ack.store(fail, Ordering::SeqCst);
    }

    /// Fail every park.
    pub fn fail_park(&self, fail: bool) {
        self.inner.fail_park.store(fail, Ordering::SeqCst);
    }

    /// Receipts acknowledged so far, in order.
    #[must_use]
    pub fn acked(&self) -> Vec<Receipt> {
        self.inner.acked.lock().unwrap().clone()
    }

    /// Receipts parked so far, with their reasons.
    #[must_use]
    pub fn parked(&self) -> Vec<(Receipt, String)> {
        self.inner.parked.lock().unwrap().clone()
    }

    /// Connections opened so far.
    #[must_use]
    pub fn connections(&self) -> usize {
        self.inner.connections.load(Ordering::SeqCst)
    }

    /// Wait up to five seconds until `count` receipts are acknowledged.
    pub async fn wait_for_acks(&self, count: usize) -> bool {
        self.wait_until(|broker| broker.acked().len() >= count).await
    }

    /// Wait up to five seconds until `condition` holds.
    pub async fn wait_until(&self, condition: impl Fn(&Self) -> bool) -> bool {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition(self) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .is_ok()
    }
}

impl SubscriptionConnector for ScriptedBroker {
    fn connect<'a>(
        &'a self,
        group: &'a str,
        _worker_id: usize,
    ) -> ConnectFuture<'a> {
        Box::pin(async move {
            if self.inner.fail_connect.load(Ordering::SeqCst) {
                return Err(SubscriptionError::Connect {
                    group: group.to_string(),
                    reason: "broker unavailable".to_string(),
                });
            }
            self.inner.connections.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(ScriptedSubscription {
                inner: Arc::clone(&self.inner),
            }) as Box<dyn PersistentSubscription>)
        })
    }
}

/// One connection to a [`ScriptedBroker`].
#[derive(Debug)]
pub struct ScriptedSubscription {
    inner: Arc<Inner>,
}

impl PersistentSubscription for ScriptedSubscription {
    fn recv(&self) -> Pin<Box<dyn Future<Output = SubscriptionMessage> + Send + '_>> {
        Box::pin(async move {
            let mut receiver = self.inner.receiver.lock().await;
            receiver.recv().await.unwrap_or_else(|| SubscriptionMessage::Dropped {
                reason: "subscription closed".to_string(),
            })
        })
    }

    fn ack<'a>(
        &'a self,
        delivery: &'a Delivery,
    ) -> Pin<Box<dyn Future<Output = Result<(), SubscriptionError>> + Send + 'a>> {
        Box::pin(async move {
            if self.inner.fail_ack.load(Ordering::SeqCst) {
                return Err(SubscriptionError::Ack("ack refused".to_string()));
            }
            self.inner.acked.lock().unwrap().push(delivery.receipt.clone());
            Ok(())
        })
    }

    fn park<'a>(
        &'a self,
        delivery: &'a Delivery,
        reason: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), SubscriptionError>> + Send + 'a>> {
        Box::pin(async move {
            if self.inner.fail_park.load(Ordering::SeqCst) {
                return Err(SubscriptionError::Park("park refused".to_string()));
            }
            self.inner
                .parked
                .lock()
                .unwrap()
                .push((delivery.receipt.clone(), reason.to_string()));
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connections_share_one_queue() {
        let broker = ScriptedBroker::new("events");
        let first = broker.connect("graph", 0).await.unwrap();
        let second = broker.connect("graph", 1).await.unwrap();

        broker.publish_empty(b"{}");
        broker.publish_empty(b"{}");
        broker.close();

        let a = first.recv().await;
        let b = second.recv().await;
        assert!(matches!(a, SubscriptionMessage::EventAppeared(_)));
        assert!(matches!(b, SubscriptionMessage::EventAppeared(_)));
        assert!(matches!(first.recv().await, SubscriptionMessage::Dropped { .. }));
        assert_eq!(broker.connections(), 2);
    }

    #[tokio::test]
    async fn ack_and_park_are_recorded() {
        let broker = ScriptedBroker::new("events");
        let sub = broker.connect("graph", 0).await.unwrap();
        broker.publish_empty(b"x");
        let SubscriptionMessage::EventAppeared(delivery) = sub.recv().await else {
            return;
        };
        sub.park(&delivery, "boom").await.unwrap();
        sub.ack(&delivery).await.unwrap();
        assert_eq!(broker.parked()[0].1, "boom");
        assert_eq!(broker.acked()[0].offset, 0);
    }
}

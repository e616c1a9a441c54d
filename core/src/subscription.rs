//! Persistent subscription port.
//!
//! A persistent subscription is a named consumer group on the event broker.
//! Several connections may join the same group; the broker spreads messages
//! across them and keeps per-stream order. Each delivered message must be
//! acknowledged, or parked for manual replay.
//!
//! ```text
//!              ┌──────────────┐
//!   recv() ──► │ EventAppeared│──► dispatch ──► Ok ─────────────► ack()
//!              │              │                 Err ──► park() ──► ack()
//!              ├──────────────┤
//!              │ Dropped      │──► worker exits with an error
//!              └──────────────┘
//! ```

use crate::event::StoredEvent;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Subscription errors.
#[derive(Error, Debug, Clone)]
pub enum SubscriptionError {
    /// Could not open the subscription
    #[error("Failed to connect to subscription group {group}: {reason}")]
    Connect {
        /// Group name
        group: String,
        /// Broker message
        reason: String,
    },

    /// The broker closed the subscription
    #[error("Subscription dropped: {reason}")]
    Dropped {
        /// Broker message
        reason: String,
    },

    /// Acknowledgement failed
    #[error("Ack failed: {0}")]
    Ack(String),

    /// Parking failed
    #[error("Park failed: {0}")]
    Park(String),
}

/// Where a delivery came from, used to acknowledge it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Receipt {
    /// Stream or topic name
    pub stream: String,
    /// Partition within the stream
    pub partition: i32,
    /// Offset within the partition
    pub offset: i64,
}

/// One delivered message.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Acknowledgement handle
    pub receipt: Receipt,
    /// Decoded envelope; `None` when the message carried no usable event
    pub event: Option<StoredEvent>,
    /// Raw message bytes, kept for parking
    pub payload: Vec<u8>,
}

/// What `recv` produced.
#[derive(Debug, Clone)]
pub enum SubscriptionMessage {
    /// A message arrived
    EventAppeared(Delivery),
    /// The subscription is gone
    Dropped {
        /// Broker message
        reason: String,
    },
}

/// One connection to a persistent subscription group.
pub trait PersistentSubscription: Send + Sync {
    /// Wait for the next message.
    fn recv(&self) -> Pin<Box<dyn Future<Output = SubscriptionMessage> + Send + '_>>;

    /// Acknowledge a delivery.
    fn ack<'a>(
        &'a self,
        delivery: &'a Delivery,
    ) -> Pin<Box<dyn Future<Output = Result<(), SubscriptionError>> + Send + 'a>>;

    /// Dead-letter a delivery for later replay.
    fn park<'a>(
        &'a self,
        delivery: &'a Delivery,
        reason: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), SubscriptionError>> + Send + 'a>>;
}

/// Future returned by [`SubscriptionConnector::connect`].
pub type ConnectFuture<'a> = Pin<
    Box<
        dyn Future<Output = Result<Box<dyn PersistentSubscription>, SubscriptionError>>
            + Send
            + 'a,
    >,
>;

/// Opens connections to subscription groups.
pub trait SubscriptionConnector: Send + Sync {
    /// Join `group` as worker `worker_id`.
    fn connect<'a>(
        &'a self,
        group: &'a str,
        worker_id: usize,
    ) -> ConnectFuture<'a>;
}

/// A delivery that was parked, as kept in the replay ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParkedEvent {
    /// Subscription group that parked it
    pub group: String,
    /// Event id, when the message decoded
    pub event_id: Option<String>,
    /// Event type, when the message decoded
    pub event_type: Option<String>,
    /// Aggregate id, when the message decoded
    pub aggregate_id: Option<String>,
    /// Tenant, when the message decoded
    pub tenant: Option<String>,
    /// Error text
    pub reason: String,
    /// Raw message bytes
    pub payload: Vec<u8>,
    /// Broker position
    pub receipt: Receipt,
}

impl ParkedEvent {
    /// Ledger entry for `delivery` parked by `group`.
    #[must_use]
    pub fn from_delivery(group: &str, delivery: &Delivery, reason: &str) -> Self {
        let event = delivery.event.as_ref();
        Self {
            group: group.to_string(),
            event_id: event.map(|e| e.event_id.clone()),
            event_type: event.map(|e| e.event_type.clone()),
            aggregate_id: event.map(|e| e.aggregate_id.clone()),
            tenant: event.map(StoredEvent::tenant).filter(|t| !t.is_empty()),
            reason: reason.to_string(),
            payload: delivery.payload.clone(),
            receipt: delivery.receipt.clone(),
        }
    }
}

/// Durable record of parked deliveries, for operators replaying them.
#[async_trait::async_trait]
pub trait ParkedEventLog: Send + Sync {
    /// Record a parked delivery.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionError::Park`] if the record could not be written.
    async fn record(&self, parked: ParkedEvent) -> Result<(), SubscriptionError>;
}

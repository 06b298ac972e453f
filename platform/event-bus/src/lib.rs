//! # EventBus Abstraction
//!
//! Broker client shared by every service that publishes or consumes
//! lifecycle events.
//!
//! Queues are durable work queues: a message stays with the broker until a
//! consumer acknowledges it, and is redelivered when the consumer naks it or
//! its connection drops before the ack. Delivery is at-least-once and FIFO
//! within a queue.
//!
//! ## Implementations
//!
//! - **NatsBus**: Production implementation using NATS JetStream
//! - **InMemoryBus**: Dev/test broker with the same durability semantics
//!
//! ## Usage
//!
//! ```rust,no_run
//! use event_bus::{ConsumerConfig, EventBus, InMemoryBus, BusMessage};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bus: Arc<dyn EventBus> = Arc::new(InMemoryBus::new());
//! bus.connect().await?;
//!
//! bus.publish("user.events", br#"{"event_type":"user.deleted","user_id":"42"}"#.to_vec())
//!     .await?;
//!
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//! let handler = Arc::new(|msg: BusMessage| async move {
//!     println!("{} bytes on {}", msg.payload.len(), msg.subject);
//!     Ok::<(), event_bus::HandlerError>(())
//! });
//! event_bus::spawn_consumer(bus, ConsumerConfig::new("user.events"), handler, shutdown_rx);
//! # Ok(())
//! # }
//! ```

mod consumer;
mod envelope;
mod inmemory_bus;
mod nats_bus;
pub mod retry;

pub use consumer::{
    run_consumer, spawn_consumer, ConsumerConfig, HandlerError, HandlerResult, MessageHandler,
};
pub use envelope::{decode_event, Decoded, EnvelopeError, EventEnvelope, EventKind};
pub use inmemory_bus::InMemoryBus;
pub use nats_bus::NatsBus;
pub use retry::{retry_with_backoff, RetryConfig};

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// A message received from the event bus
#[derive(Debug, Clone)]
pub struct BusMessage {
    /// The queue this message was published to
    pub subject: String,
    /// The message payload (raw bytes)
    pub payload: Vec<u8>,
    /// Optional headers
    pub headers: Option<std::collections::HashMap<String, String>>,
    /// How many times the broker has handed this message out, this delivery included
    pub delivery_count: u32,
}

impl BusMessage {
    /// Create a new bus message on its first delivery
    pub fn new(subject: String, payload: Vec<u8>) -> Self {
        Self {
            subject,
            payload,
            headers: None,
            delivery_count: 1,
        }
    }

    /// Add headers to the message
    pub fn with_headers(mut self, headers: std::collections::HashMap<String, String>) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn with_delivery_count(mut self, delivery_count: u32) -> Self {
        self.delivery_count = delivery_count;
        self
    }
}

/// Settles a single delivery with the broker that produced it.
#[async_trait]
pub trait Acker: Send + Sync {
    /// Remove the message from the queue.
    async fn ack(&self) -> BusResult<()>;
    /// Return the message to the head of the queue for redelivery.
    async fn nak(&self) -> BusResult<()>;
}

/// A message handed out by a subscription, settled exactly once by `ack` or `nak`.
pub struct Delivery {
    pub message: BusMessage,
    acker: Box<dyn Acker>,
}

impl Delivery {
    pub fn new(message: BusMessage, acker: Box<dyn Acker>) -> Self {
        Self { message, acker }
    }

    pub async fn ack(self) -> BusResult<()> {
        self.acker.ack().await
    }

    pub async fn nak(self) -> BusResult<()> {
        self.acker.nak().await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

/// Errors that can occur when using the event bus
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("failed to publish message: {0}")]
    PublishError(String),

    #[error("failed to subscribe to queue: {0}")]
    SubscribeError(String),

    #[error("connection error: {0}")]
    ConnectionError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("failed to settle delivery: {0}")]
    AckError(String),

    #[error("event bus is closed")]
    Closed,

    #[error("internal error: {0}")]
    InternalError(String),
}

/// Result type for event bus operations
pub type BusResult<T> = Result<T, BusError>;

/// Core broker client abstraction
///
/// `publish` and `subscribe` connect lazily, so callers only need `connect`
/// when they want startup to fail fast on an unreachable broker.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Establish the connection, retrying with the configured fixed delay.
    ///
    /// Returns `BusError::ConnectionError` once the attempt budget is spent,
    /// and `BusError::Closed` after `close`.
    async fn connect(&self) -> BusResult<()>;

    /// Publish a payload to a durable queue, declaring the queue if needed.
    ///
    /// Returns once the broker has accepted the write.
    async fn publish(&self, queue: &str, payload: Vec<u8>) -> BusResult<()>;

    /// Subscribe to a durable queue.
    ///
    /// The stream ends when the connection drops; deliveries that were not
    /// settled by then are redelivered to the next subscriber.
    async fn subscribe(&self, queue: &str) -> BusResult<BoxStream<'static, Delivery>>;

    /// Release the connection. Later calls fail with `BusError::Closed`.
    async fn close(&self) -> BusResult<()>;

    /// Whether the client currently holds a live connection
    fn is_connected(&self) -> bool;

    /// Run the consumer loop for `config.queue` until `shutdown` flips to `true`.
    async fn consume(
        &self,
        config: ConsumerConfig,
        handler: Arc<dyn MessageHandler>,
        shutdown: watch::Receiver<bool>,
    ) -> BusResult<()> {
        run_consumer(self, &config, handler.as_ref(), shutdown).await
    }
}

impl fmt::Debug for dyn EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventBus")
    }
}

//! NATS JetStream implementation of the EventBus trait

use crate::retry::{retry_with_backoff, RetryConfig};
use crate::{Acker, BusError, BusMessage, BusResult, Delivery, EventBus};
use async_nats::jetstream::{self, consumer, stream, AckKind};
use async_nats::Client;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

/// How long dead-lettered messages are kept for inspection
const DEAD_LETTER_MAX_AGE: Duration = Duration::from_secs(14 * 24 * 60 * 60);

/// EventBus implementation using NATS JetStream
///
/// Every queue is a file-backed work-queue stream with a single subject of
/// the same name (`user.events` is stored in stream `USER_EVENTS`), so a
/// message is removed once it is acked. Subscribers read through a durable
/// pull consumer named after the service, and instances of one service share
/// it. Each queue has one consuming service.
///
/// Dead-letter queues (`*.dlq`) have no consumer; they keep messages for
/// [`DEAD_LETTER_MAX_AGE`] instead.
///
/// # Example
/// ```rust,no_run
/// use event_bus::{EventBus, NatsBus};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bus = NatsBus::new("nats://localhost:4222", "notes");
/// bus.connect().await?;
/// bus.publish("user.events", b"hello".to_vec()).await?;
/// # Ok(())
/// # }
/// ```
pub struct NatsBus {
    url: String,
    consumer_name: String,
    retry: RetryConfig,
    conn: RwLock<Option<Connection>>,
    declared: Mutex<HashSet<String>>,
    closed: AtomicBool,
}

#[derive(Clone)]
struct Connection {
    client: Client,
    jetstream: jetstream::Context,
}

/// Stream name for a queue: `user.events` -> `USER_EVENTS`
fn stream_name(queue: &str) -> String {
    queue
        .chars()
        .map(|c| match c {
            '.' | '-' | '*' | '>' | ' ' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect()
}

fn stream_config(queue: &str) -> stream::Config {
    let mut config = stream::Config {
        name: stream_name(queue),
        subjects: vec![queue.to_string()],
        storage: stream::StorageType::File,
        retention: stream::RetentionPolicy::WorkQueue,
        ..Default::default()
    };
    if queue.ends_with(".dlq") {
        config.retention = stream::RetentionPolicy::Limits;
        config.max_age = DEAD_LETTER_MAX_AGE;
    }
    config
}

impl NatsBus {
    /// Create a client for `url`; `consumer_name` names this service's
    /// durable consumers. Nothing is dialled until the first use.
    pub fn new(url: impl Into<String>, consumer_name: impl Into<String>) -> Self {
        Self::with_retry_config(url, consumer_name, RetryConfig::connect_default())
    }

    pub fn with_retry_config(
        url: impl Into<String>,
        consumer_name: impl Into<String>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            url: url.into(),
            consumer_name: consumer_name.into(),
            retry,
            conn: RwLock::new(None),
            declared: Mutex::new(HashSet::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Get the underlying NATS client, if connected
    pub fn client(&self) -> Option<Client> {
        self.current().map(|c| c.client)
    }

    fn current(&self) -> Option<Connection> {
        self.conn.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    async fn jetstream(&self) -> BusResult<jetstream::Context> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }
        if let Some(conn) = self.current() {
            return Ok(conn.jetstream);
        }
        self.connect().await?;
        self.current()
            .map(|c| c.jetstream)
            .ok_or(BusError::Closed)
    }

    /// Declare the durable stream backing `queue`.
    async fn ensure_stream(
        &self,
        js: &jetstream::Context,
        queue: &str,
    ) -> BusResult<stream::Stream> {
        let config = stream_config(queue);
        let name = config.name.clone();

        let stream = js
            .get_or_create_stream(config)
            .await
            .map_err(|e| BusError::SubscribeError(format!("stream {}: {}", name, e)))?;

        let first = self
            .declared
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(queue.to_string());
        if first {
            tracing::info!(queue = %queue, stream = %name, "Declared durable queue");
        }
        Ok(stream)
    }

    fn is_declared(&self, queue: &str) -> bool {
        self.declared
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(queue)
    }
}

#[async_trait]
impl EventBus for NatsBus {
    async fn connect(&self) -> BusResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }
        if self.current().is_some() {
            return Ok(());
        }

        let client = retry_with_backoff(
            || async move {
                async_nats::connect(self.url.as_str())
                    .await
                    .map_err(|e| BusError::ConnectionError(e.to_string()))
            },
            &self.retry,
            "nats_connect",
        )
        .await?;

        tracing::info!(url = %self.url, "Connected to NATS");
        let jetstream = jetstream::new(client.clone());
        *self.conn.write().unwrap_or_else(|e| e.into_inner()) = Some(Connection { client, jetstream });
        Ok(())
    }

    async fn publish(&self, queue: &str, payload: Vec<u8>) -> BusResult<()> {
        let js = self.jetstream().await?;
        if !self.is_declared(queue) {
            self.ensure_stream(&js, queue)
                .await
                .map_err(|e| BusError::PublishError(e.to_string()))?;
        }

        js.publish(queue.to_string(), payload.into())
            .await
            .map_err(|e| BusError::PublishError(e.to_string()))?
            .await
            .map_err(|e| BusError::PublishError(e.to_string()))?;

        Ok(())
    }

    async fn subscribe(&self, queue: &str) -> BusResult<BoxStream<'static, Delivery>> {
        let js = self.jetstream().await?;
        let stream = self.ensure_stream(&js, queue).await?;

        let durable = format!("{}-{}", self.consumer_name, stream_name(queue));
        let pull: consumer::PullConsumer = stream
            .get_or_create_consumer(
                &durable,
                consumer::pull::Config {
                    durable_name: Some(durable.clone()),
                    ack_policy: consumer::AckPolicy::Explicit,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| BusError::SubscribeError(e.to_string()))?;

        let mut messages = pull
            .messages()
            .await
            .map_err(|e| BusError::SubscribeError(e.to_string()))?;

        let queue = queue.to_string();
        let deliveries = async_stream::stream! {
            while let Some(next) = messages.next().await {
                match next {
                    Ok(msg) => {
                        let delivered = msg
                            .info()
                            .map(|info| u32::try_from(info.delivered).unwrap_or(u32::MAX))
                            .unwrap_or(1);
                        let message = BusMessage::new(msg.subject.to_string(), msg.payload.to_vec())
                            .with_delivery_count(delivered);
                        yield Delivery::new(message, Box::new(NatsAcker { msg }));
                    }
                    Err(e) => {
                        tracing::warn!(queue = %queue, error = %e, "JetStream pull failed, ending subscription");
                        break;
                    }
                }
            }
        };

        Ok(deliveries.boxed())
    }

    async fn close(&self) -> BusResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        let conn = self.conn.write().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(conn) = conn {
            conn.client
                .flush()
                .await
                .map_err(|e| BusError::ConnectionError(e.to_string()))?;
            tracing::info!("NATS connection closed");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.current()
            .map(|c| c.client.connection_state() == async_nats::connection::State::Connected)
            .unwrap_or(false)
    }
}

struct NatsAcker {
    msg: jetstream::Message,
}

#[async_trait]
impl Acker for NatsAcker {
    async fn ack(&self) -> BusResult<()> {
        self.msg
            .ack()
            .await
            .map_err(|e| BusError::AckError(e.to_string()))
    }

    async fn nak(&self) -> BusResult<()> {
        self.msg
            .ack_with(AckKind::Nak(None))
            .await
            .map_err(|e| BusError::AckError(e.to_string()))
    }
}

//! Long-lived consumer loop
//!
//! Pulls deliveries from one queue, hands each to a [`MessageHandler`], and
//! settles it by the handler's result: ack on success, nak (requeue) on
//! failure, dead-letter once the delivery budget is spent. A dropped
//! connection ends the subscription and the loop resubscribes.

use crate::{BusError, BusMessage, BusResult, Delivery, EventBus};
use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;
pub type HandlerResult = Result<(), HandlerError>;

/// Processes one message. An `Err` means "not applied, deliver again".
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, msg: &BusMessage) -> HandlerResult;
}

#[async_trait]
impl<F, Fut> MessageHandler for F
where
    F: Fn(BusMessage) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send,
{
    async fn handle(&self, msg: &BusMessage) -> HandlerResult {
        (self)(msg.clone()).await
    }
}

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub queue: String,
    /// Deliveries after which a failing message goes to the dead-letter queue
    pub max_deliveries: u32,
    pub dead_letter_queue: String,
    /// Pause before resubscribing after the subscription ends or fails
    pub reconnect_delay: Duration,
}

impl ConsumerConfig {
    pub fn new(queue: impl Into<String>) -> Self {
        let queue = queue.into();
        Self {
            dead_letter_queue: format!("{}.dlq", queue),
            queue,
            max_deliveries: 5,
            reconnect_delay: Duration::from_secs(5),
        }
    }

    pub fn with_max_deliveries(mut self, max_deliveries: u32) -> Self {
        self.max_deliveries = max_deliveries.max(1);
        self
    }

    pub fn with_reconnect_delay(mut self, reconnect_delay: Duration) -> Self {
        self.reconnect_delay = reconnect_delay;
        self
    }

    pub fn with_dead_letter_queue(mut self, queue: impl Into<String>) -> Self {
        self.dead_letter_queue = queue.into();
        self
    }
}

/// Spawn [`run_consumer`] on its own task.
pub fn spawn_consumer(
    bus: Arc<dyn EventBus>,
    config: ConsumerConfig,
    handler: Arc<dyn MessageHandler>,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<BusResult<()>> {
    tokio::spawn(async move { bus.consume(config, handler, shutdown).await })
}

/// Consume `config.queue` until `shutdown` becomes `true` or the bus is closed.
///
/// The shutdown signal is observed between messages; a message already handed
/// to the handler is always settled first.
pub async fn run_consumer<B: EventBus + ?Sized>(
    bus: &B,
    config: &ConsumerConfig,
    handler: &dyn MessageHandler,
    mut shutdown: watch::Receiver<bool>,
) -> BusResult<()> {
    tracing::info!(queue = %config.queue, "Starting consumer");

    'subscribe: loop {
        if *shutdown.borrow() {
            break;
        }

        let mut stream = match bus.subscribe(&config.queue).await {
            Ok(s) => s,
            Err(BusError::Closed) => {
                tracing::info!(queue = %config.queue, "Event bus closed, consumer exiting");
                return Ok(());
            }
            Err(e) => {
                tracing::error!("Failed to subscribe to {}: {}", config.queue, e);
                if wait_or_shutdown(&mut shutdown, config.reconnect_delay).await {
                    break;
                }
                continue;
            }
        };

        tracing::info!("Subscribed to {}", config.queue);

        loop {
            let next = tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break 'subscribe;
                    }
                    continue;
                }
                next = stream.next() => next,
            };

            let Some(delivery) = next else {
                tracing::warn!(queue = %config.queue, "Subscription ended, reconnecting");
                break;
            };

            process_delivery(bus, config, handler, delivery).await;
        }

        if wait_or_shutdown(&mut shutdown, config.reconnect_delay).await {
            break;
        }
    }

    tracing::info!(queue = %config.queue, "Consumer stopped");
    Ok(())
}

/// Sleep for `delay`; returns `true` if shutdown was requested meanwhile.
async fn wait_or_shutdown(shutdown: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return *shutdown.borrow(),
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return true;
                }
            }
        }
    }
}

async fn process_delivery<B: EventBus + ?Sized>(
    bus: &B,
    config: &ConsumerConfig,
    handler: &dyn MessageHandler,
    delivery: Delivery,
) {
    let (event_type, event_id) = envelope_fields(&delivery.message.payload);
    let span = tracing::info_span!(
        "process_event",
        queue = %delivery.message.subject,
        event_type = %event_type.as_deref().unwrap_or("unknown"),
        event_id = %event_id.as_deref().unwrap_or("none"),
        delivery = delivery.message.delivery_count,
    );

    async {
        let outcome = handler.handle(&delivery.message).await;
        let attempts = delivery.message.delivery_count;

        let settled = match outcome {
            Ok(()) => delivery.ack().await,
            Err(e) if attempts >= config.max_deliveries => {
                tracing::error!(
                    attempts = attempts,
                    error = %e,
                    dead_letter_queue = %config.dead_letter_queue,
                    "Delivery budget exhausted, moving message to DLQ"
                );
                dead_letter(bus, config, delivery, &e.to_string()).await
            }
            Err(e) => {
                tracing::warn!(
                    attempts = attempts,
                    max_deliveries = config.max_deliveries,
                    error = %e,
                    "Handler failed, requeueing message"
                );
                delivery.nak().await
            }
        };

        if let Err(e) = settled {
            // The broker redelivers anything we failed to settle
            tracing::warn!(error = %e, "Failed to settle delivery");
        }
    }
    .instrument(span)
    .await
}

async fn dead_letter<B: EventBus + ?Sized>(
    bus: &B,
    config: &ConsumerConfig,
    delivery: Delivery,
    error: &str,
) -> BusResult<()> {
    let msg = &delivery.message;
    let payload = serde_json::from_slice::<serde_json::Value>(&msg.payload).unwrap_or_else(|_| {
        serde_json::Value::String(String::from_utf8_lossy(&msg.payload).into_owned())
    });
    let record = serde_json::json!({
        "queue": msg.subject,
        "error": error,
        "attempts": msg.delivery_count,
        "failed_at": Utc::now(),
        "payload": payload,
    });

    let bytes = match serde_json::to_vec(&record) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize DLQ record");
            return delivery.nak().await;
        }
    };

    match bus.publish(&config.dead_letter_queue, bytes).await {
        Ok(()) => delivery.ack().await,
        Err(e) => {
            tracing::error!(
                error = %e,
                dead_letter_queue = %config.dead_letter_queue,
                "Failed to publish to DLQ, requeueing message"
            );
            delivery.nak().await
        }
    }
}

fn envelope_fields(payload: &[u8]) -> (Option<String>, Option<String>) {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(payload) else {
        return (None, None);
    };
    let field = |name: &str| value.get(name).and_then(|v| v.as_str()).map(str::to_string);
    (field("event_type"), field("event_id"))
}

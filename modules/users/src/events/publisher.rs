use event_bus::{retry_with_backoff, BusError, EventBus, EventEnvelope, EventKind, RetryConfig};
use platform_contracts::{UserEvent, USER_EVENTS_QUEUE};
use std::sync::Arc;
use std::time::Duration;

use crate::metrics::Metrics;

/// Publishes user lifecycle events after the local write has committed.
///
/// There is no outbox: if every retry fails the event is lost, which is
/// logged and counted in `users_events_publish_failed_total`.
///
/// The whole attempt, broker reconnects included, is bounded by `deadline`
/// so a broker outage never holds the caller past it.
#[derive(Clone)]
pub struct EventPublisher {
    bus: Arc<dyn EventBus>,
    source_module: String,
    retry: RetryConfig,
    deadline: Duration,
    metrics: Metrics,
}

impl EventPublisher {
    pub fn new(bus: Arc<dyn EventBus>, source_module: impl Into<String>, metrics: Metrics) -> Self {
        Self {
            bus,
            source_module: source_module.into(),
            retry: RetryConfig::default(),
            deadline: Duration::from_secs(5),
            metrics,
        }
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Publish `event` to `user.events`. Never fails the caller.
    pub async fn publish_user_event(&self, event: UserEvent) {
        let envelope = EventEnvelope::new(self.source_module.clone(), event);
        let event_type = envelope.event.event_type();
        let user_id = envelope.event.user_id().to_string();
        let event_id = envelope.idempotency_key();

        match self.publish(&envelope).await {
            Ok(()) => {
                self.metrics
                    .user_events_published_total
                    .with_label_values(&[event_type])
                    .inc();
                tracing::info!(
                    event_id = %event_id,
                    event_type = %event_type,
                    user_id = %user_id,
                    "Published user event"
                );
            }
            Err(e) => {
                self.metrics
                    .user_events_publish_failed_total
                    .with_label_values(&[event_type])
                    .inc();
                tracing::error!(
                    event_id = %event_id,
                    event_type = %event_type,
                    user_id = %user_id,
                    error = %e,
                    "User event lost after commit - downstream services will not see this change"
                );
            }
        }
    }

    async fn publish(&self, envelope: &EventEnvelope<UserEvent>) -> Result<(), BusError> {
        let bytes = envelope
            .to_bytes()
            .map_err(|e| BusError::SerializationError(e.to_string()))?;

        let attempt = retry_with_backoff(
            || {
                let bytes = bytes.clone();
                async move { self.bus.publish(USER_EVENTS_QUEUE, bytes).await }
            },
            &self.retry,
            "publish_user_event",
        );

        tokio::time::timeout(self.deadline, attempt)
            .await
            .map_err(|_| BusError::PublishError(format!("no broker within {:?}", self.deadline)))?
    }
}

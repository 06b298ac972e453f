//! `user.events` consumer for the notes service

use async_trait::async_trait;
use event_bus::{decode_event, BusMessage, Decoded, EventKind, HandlerResult, MessageHandler};
use platform_contracts::UserEvent;
use std::time::Instant;

use super::handlers::UserEventHandlers;
use crate::metrics::Metrics;

/// Decodes each delivery once and dispatches it by event type.
///
/// Unknown types are acknowledged without side effects. Undecodable payloads
/// and failed effects return `Err`, which requeues the message.
pub struct UserEventsHandler {
    handlers: UserEventHandlers,
    metrics: Metrics,
}

impl UserEventsHandler {
    pub fn new(handlers: UserEventHandlers, metrics: Metrics) -> Self {
        Self { handlers, metrics }
    }

    fn record(&self, event_type: &str, outcome: &str) {
        self.metrics
            .user_events_consumed_total
            .with_label_values(&[event_type, outcome])
            .inc();
    }
}

#[async_trait]
impl MessageHandler for UserEventsHandler {
    async fn handle(&self, msg: &BusMessage) -> HandlerResult {
        let envelope = match decode_event::<UserEvent>(&msg.payload) {
            Ok(Decoded::Known(envelope)) => envelope,
            Ok(Decoded::Unknown { event_type }) => {
                tracing::warn!(event_type = %event_type, "Ignoring unknown event type");
                self.record(&event_type, "ignored");
                return Ok(());
            }
            Err(e) => {
                tracing::warn!(error = %e, "Undecodable user event");
                self.record("unknown", "failed");
                return Err(Box::new(e));
            }
        };

        let event_id = envelope.idempotency_key();
        let event_type = envelope.event.event_type();
        let start = Instant::now();

        let result = match &envelope.event {
            UserEvent::UserCreated { user_id, .. } => {
                self.handlers.handle_user_created(event_id, user_id).await
            }
            UserEvent::UserDeleted { user_id } => {
                self.handlers.handle_user_deleted(event_id, user_id).await
            }
        };

        self.metrics
            .event_processing_duration_seconds
            .with_label_values(&[event_type])
            .observe(start.elapsed().as_secs_f64());

        match result {
            Ok(outcome) => {
                self.record(event_type, outcome.as_str());
                Ok(())
            }
            Err(e) => {
                self.record(event_type, "failed");
                Err(Box::new(e))
            }
        }
    }
}

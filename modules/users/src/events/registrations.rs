//! Registration replay
//!
//! Consumes `user.created` events from `user.registrations` and materializes
//! the user locally. A user that already exists is a duplicate, not an error,
//! so redeliveries and replays are harmless.

use async_trait::async_trait;
use event_bus::{decode_event, BusMessage, Decoded, HandlerResult, MessageHandler};
use platform_contracts::UserEvent;
use std::sync::Arc;

use crate::error::UserError;
use crate::manager::UserManager;
use crate::metrics::Metrics;
use crate::models::UserCreate;

pub struct RegistrationHandler {
    manager: Arc<UserManager>,
    metrics: Metrics,
}

impl RegistrationHandler {
    pub fn new(manager: Arc<UserManager>, metrics: Metrics) -> Self {
        Self { manager, metrics }
    }

    fn record(&self, event_type: &str, outcome: &str) {
        self.metrics
            .registration_events_consumed_total
            .with_label_values(&[event_type, outcome])
            .inc();
    }
}

#[async_trait]
impl MessageHandler for RegistrationHandler {
    async fn handle(&self, msg: &BusMessage) -> HandlerResult {
        let envelope = match decode_event::<UserEvent>(&msg.payload)? {
            Decoded::Known(envelope) => envelope,
            Decoded::Unknown { event_type } => {
                tracing::debug!(event_type = %event_type, "Ignoring unknown event type");
                self.record(&event_type, "ignored");
                return Ok(());
            }
        };

        let event_id = envelope.idempotency_key();
        match envelope.event {
            UserEvent::UserCreated {
                user_id,
                username,
                email,
            } => {
                let data = UserCreate::replayed(user_id.clone(), username, email);
                match self.manager.register_user(data).await {
                    Ok(_) => {
                        tracing::info!(event_id = %event_id, user_id = %user_id, "Replayed registration");
                        self.record(UserEvent::CREATED, "applied");
                        Ok(())
                    }
                    Err(UserError::DuplicateUsername | UserError::AlreadyExists(_)) => {
                        tracing::info!(
                            event_id = %event_id,
                            user_id = %user_id,
                            "Duplicate registration ignored (user already exists)"
                        );
                        self.record(UserEvent::CREATED, "duplicate");
                        Ok(())
                    }
                    Err(e) => {
                        self.record(UserEvent::CREATED, "failed");
                        Err(Box::new(e))
                    }
                }
            }
            UserEvent::UserDeleted { .. } => {
                tracing::debug!(event_id = %event_id, "Ignoring user.deleted on registration queue");
                self.record(UserEvent::DELETED, "ignored");
                Ok(())
            }
        }
    }
}

//! Side effects of user lifecycle events on notes
//!
//! Each handler first consults the processed-event ledger, then applies an
//! effect that is itself safe to repeat, then records the key.

use std::sync::Arc;
use uuid::Uuid;

use crate::error::NoteError;
use crate::manager::NoteManager;
use crate::processed::ProcessedEvents;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    /// The event id was already in the ledger
    Duplicate,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Applied => "applied",
            Outcome::Duplicate => "duplicate",
        }
    }
}

pub struct UserEventHandlers {
    manager: Arc<NoteManager>,
    processed: Arc<dyn ProcessedEvents>,
}

impl UserEventHandlers {
    pub fn new(manager: Arc<NoteManager>, processed: Arc<dyn ProcessedEvents>) -> Self {
        Self { manager, processed }
    }

    /// `user.created`: give the user a welcome note
    pub async fn handle_user_created(&self, event_id: Uuid, user_id: &str) -> Result<Outcome, NoteError> {
        if self.processed.is_processed(event_id).await? {
            tracing::info!(event_id = %event_id, "Duplicate event ignored (already processed)");
            return Ok(Outcome::Duplicate);
        }

        match self.manager.ensure_welcome_note(user_id).await? {
            Some(note) => {
                tracing::info!(user_id = %user_id, note_id = %note.id, "Welcome note created")
            }
            None => tracing::info!(user_id = %user_id, "Welcome note already exists"),
        }

        self.processed.mark_processed(event_id, "user.created").await?;
        Ok(Outcome::Applied)
    }

    /// `user.deleted`: remove every note the user owned
    pub async fn handle_user_deleted(&self, event_id: Uuid, user_id: &str) -> Result<Outcome, NoteError> {
        if self.processed.is_processed(event_id).await? {
            tracing::info!(event_id = %event_id, "Duplicate event ignored (already processed)");
            return Ok(Outcome::Duplicate);
        }

        let deleted = self.manager.delete_notes_by_user(user_id).await?;
        tracing::info!(user_id = %user_id, deleted, "Deleted notes of removed user");

        self.processed.mark_processed(event_id, "user.deleted").await?;
        Ok(Outcome::Applied)
    }
}

//! Note domain operations
//!
//! The event-path helpers at the bottom are built only from the public
//! operations, so HTTP and events share one set of validation rules.

use chrono::Utc;
use platform_contracts::{WELCOME_NOTE_CONTENT, WELCOME_NOTE_TITLE};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::NoteError;
use crate::models::{Note, NoteCreate, NoteUpdate};
use crate::repos::NoteRepository;

pub struct NoteManager {
    repo: Arc<dyn NoteRepository>,
}

impl NoteManager {
    pub fn new(repo: Arc<dyn NoteRepository>) -> Self {
        Self { repo }
    }

    pub async fn create_note(&self, data: NoteCreate, user_id: &str) -> Result<Note, NoteError> {
        let title = validate_title(&data.title)?;
        let now = Utc::now();
        let note = Note {
            id: Uuid::new_v4().to_string(),
            title,
            content: data.content,
            user_id: user_id.to_string(),
            created_at: now,
            updated_at: now,
        };

        let note = self.repo.create(note).await?;
        tracing::debug!(note_id = %note.id, user_id = %user_id, "Note created");
        Ok(note)
    }

    pub async fn get_note(&self, id: &str) -> Result<Note, NoteError> {
        self.repo.get(id).await?.ok_or(NoteError::NotFound)
    }

    pub async fn update_note(&self, id: &str, data: NoteUpdate) -> Result<Note, NoteError> {
        let changes = NoteUpdate {
            title: data.title.as_deref().map(validate_title).transpose()?,
            content: data.content,
        };
        self.repo.update(id, changes).await?.ok_or(NoteError::NotFound)
    }

    pub async fn delete_note(&self, id: &str) -> Result<(), NoteError> {
        if self.repo.delete(id).await? {
            Ok(())
        } else {
            Err(NoteError::NotFound)
        }
    }

    pub async fn get_notes_by_user(&self, user_id: &str) -> Result<Vec<Note>, NoteError> {
        Ok(self.repo.list_by_owner(user_id).await?)
    }

    /// Create the welcome note unless the user already has one.
    ///
    /// Returns the note when it was created, `None` when it already existed.
    pub async fn ensure_welcome_note(&self, user_id: &str) -> Result<Option<Note>, NoteError> {
        let existing = self.get_notes_by_user(user_id).await?;
        if existing.iter().any(|n| n.title == WELCOME_NOTE_TITLE) {
            return Ok(None);
        }

        let data = NoteCreate {
            title: WELCOME_NOTE_TITLE.to_string(),
            content: WELCOME_NOTE_CONTENT.to_string(),
        };
        self.create_note(data, user_id).await.map(Some)
    }

    /// Delete every note owned by `user_id`.
    ///
    /// A note that disappears between listing and deleting counts as deleted.
    /// Returns how many notes this call removed.
    pub async fn delete_notes_by_user(&self, user_id: &str) -> Result<usize, NoteError> {
        let mut deleted = 0;
        for note in self.get_notes_by_user(user_id).await? {
            match self.delete_note(&note.id).await {
                Ok(()) => deleted += 1,
                Err(NoteError::NotFound) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(deleted)
    }
}

fn validate_title(title: &str) -> Result<String, NoteError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(NoteError::Validation("title must not be empty".to_string()));
    }
    Ok(title.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repos::InMemoryNoteRepository;

    fn manager() -> NoteManager {
        NoteManager::new(Arc::new(InMemoryNoteRepository::new()))
    }

    fn data(title: &str) -> NoteCreate {
        NoteCreate {
            title: title.to_string(),
            content: "body".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let manager = manager();
        let note = manager.create_note(data("  Groceries "), "u1").await.unwrap();

        assert_eq!(note.title, "Groceries");
        assert_eq!(note.user_id, "u1");
        assert_eq!(manager.get_note(&note.id).await.unwrap(), note);
    }

    #[tokio::test]
    async fn test_blank_title_is_rejected() {
        let manager = manager();
        assert!(matches!(
            manager.create_note(data("   "), "u1").await,
            Err(NoteError::Validation(_))
        ));

        let note = manager.create_note(data("ok"), "u1").await.unwrap();
        let blank = NoteUpdate {
            title: Some(String::new()),
            ..Default::default()
        };
        assert!(matches!(
            manager.update_note(&note.id, blank).await,
            Err(NoteError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_update_and_delete_missing_note() {
        let manager = manager();
        assert!(matches!(
            manager.update_note("nope", NoteUpdate::default()).await,
            Err(NoteError::NotFound)
        ));
        assert!(matches!(manager.delete_note("nope").await, Err(NoteError::NotFound)));
    }

    #[tokio::test]
    async fn test_welcome_note_is_created_once() {
        let manager = manager();

        let first = manager.ensure_welcome_note("u1").await.unwrap();
        let second = manager.ensure_welcome_note("u1").await.unwrap();

        assert_eq!(first.map(|n| n.title), Some(WELCOME_NOTE_TITLE.to_string()));
        assert!(second.is_none());
        assert_eq!(manager.get_notes_by_user("u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_notes_by_user_leaves_others() {
        let manager = manager();
        for title in ["a", "b", "c"] {
            manager.create_note(data(title), "u1").await.unwrap();
        }
        manager.create_note(data("keep"), "u2").await.unwrap();

        assert_eq!(manager.delete_notes_by_user("u1").await.unwrap(), 3);
        assert!(manager.get_notes_by_user("u1").await.unwrap().is_empty());
        assert_eq!(manager.get_notes_by_user("u2").await.unwrap().len(), 1);
        assert_eq!(manager.delete_notes_by_user("u1").await.unwrap(), 0);
    }
}

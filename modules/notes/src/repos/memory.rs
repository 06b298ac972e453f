use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::{NoteRepository, RepoError};
use crate::models::{Note, NoteUpdate};

/// Process-local note store for dev and tests
#[derive(Default)]
pub struct InMemoryNoteRepository {
    notes: Mutex<HashMap<String, Note>>,
}

impl InMemoryNoteRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Note>> {
        self.notes.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl NoteRepository for InMemoryNoteRepository {
    async fn create(&self, note: Note) -> Result<Note, RepoError> {
        let mut notes = self.lock();
        if notes.contains_key(&note.id) {
            return Err(RepoError::Conflict(format!("id {}", note.id)));
        }
        notes.insert(note.id.clone(), note.clone());
        Ok(note)
    }

    async fn get(&self, id: &str) -> Result<Option<Note>, RepoError> {
        Ok(self.lock().get(id).cloned())
    }

    async fn list_by_owner(&self, user_id: &str) -> Result<Vec<Note>, RepoError> {
        let mut notes: Vec<Note> = self
            .lock()
            .values()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        notes.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(notes)
    }

    async fn update(&self, id: &str, changes: NoteUpdate) -> Result<Option<Note>, RepoError> {
        let mut notes = self.lock();
        let Some(note) = notes.get_mut(id) else {
            return Ok(None);
        };
        if let Some(title) = changes.title {
            note.title = title;
        }
        if let Some(content) = changes.content {
            note.content = content;
        }
        note.updated_at = Utc::now();
        Ok(Some(note.clone()))
    }

    async fn delete(&self, id: &str) -> Result<bool, RepoError> {
        Ok(self.lock().remove(id).is_some())
    }

    async fn ping(&self) -> Result<(), RepoError> {
        Ok(())
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(id: &str, user_id: &str) -> Note {
        let now = Utc::now();
        Note {
            id: id.to_string(),
            title: format!("note {}", id),
            content: String::new(),
            user_id: user_id.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_list_by_owner_filters() {
        let repo = InMemoryNoteRepository::new();
        repo.create(note("n1", "alice")).await.unwrap();
        repo.create(note("n2", "bob")).await.unwrap();
        repo.create(note("n3", "alice")).await.unwrap();

        let ids: Vec<String> = repo
            .list_by_owner("alice")
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"n1".to_string()) && ids.contains(&"n3".to_string()));
    }

    #[tokio::test]
    async fn test_sparse_update_and_missing_note() {
        let repo = InMemoryNoteRepository::new();
        repo.create(note("n1", "alice")).await.unwrap();

        let updated = repo
            .update(
                "n1",
                NoteUpdate {
                    content: Some("body".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.title, "note n1");
        assert_eq!(updated.content, "body");

        assert!(repo.update("nope", NoteUpdate::default()).await.unwrap().is_none());
        assert!(!repo.delete("nope").await.unwrap());
        assert!(repo.delete("n1").await.unwrap());
    }
}

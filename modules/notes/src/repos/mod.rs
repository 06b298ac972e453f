//! Note persistence
//!
//! `STORE_TYPE` picks Postgres or the in-memory store at startup.

mod memory;
mod postgres;

pub use memory::InMemoryNoteRepository;
pub use postgres::PgNoteRepository;

use async_trait::async_trait;

use crate::models::{Note, NoteUpdate};

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait NoteRepository: Send + Sync {
    async fn create(&self, note: Note) -> Result<Note, RepoError>;

    async fn get(&self, id: &str) -> Result<Option<Note>, RepoError>;

    /// Oldest first
    async fn list_by_owner(&self, user_id: &str) -> Result<Vec<Note>, RepoError>;

    /// Apply the present fields and stamp `updated_at`. `None` if no such note.
    async fn update(&self, id: &str, changes: NoteUpdate) -> Result<Option<Note>, RepoError>;

    /// `false` if no such note
    async fn delete(&self, id: &str) -> Result<bool, RepoError>;

    async fn ping(&self) -> Result<(), RepoError>;

    async fn close(&self);
}

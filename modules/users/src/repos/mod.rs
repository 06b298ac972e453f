//! User persistence
//!
//! The manager only sees [`UserRepository`]; `STORE_TYPE` picks Postgres or
//! the in-memory store at startup.

mod memory;
mod postgres;

pub use memory::InMemoryUserRepository;
pub use postgres::PgUserRepository;

use async_trait::async_trait;

use crate::models::{User, UserChanges};

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// A unique constraint (id or username) rejected the write
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: User) -> Result<User, RepoError>;

    async fn get(&self, id: &str) -> Result<Option<User>, RepoError>;

    async fn get_by_username(&self, username: &str) -> Result<Option<User>, RepoError>;

    async fn list(&self) -> Result<Vec<User>, RepoError>;

    /// Apply the present fields and stamp `updated_at`. `None` if no such user.
    async fn update(&self, id: &str, changes: UserChanges) -> Result<Option<User>, RepoError>;

    /// `false` if no such user
    async fn delete(&self, id: &str) -> Result<bool, RepoError>;

    /// Readiness probe
    async fn ping(&self) -> Result<(), RepoError>;

    async fn close(&self);
}

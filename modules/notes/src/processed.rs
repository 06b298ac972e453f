//! Idempotency ledger for consumed events
//!
//! A key is marked only after its side effect completed, so a crash in
//! between replays the effect; the effects themselves tolerate that.

use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashSet;
use std::sync::Mutex;
use uuid::Uuid;

use crate::repos::RepoError;

#[async_trait]
pub trait ProcessedEvents: Send + Sync {
    async fn is_processed(&self, event_id: Uuid) -> Result<bool, RepoError>;

    /// Record `event_id`; marking an already processed key is a no-op
    async fn mark_processed(&self, event_id: Uuid, event_type: &str) -> Result<(), RepoError>;
}

#[derive(Default)]
pub struct InMemoryProcessedEvents {
    seen: Mutex<HashSet<Uuid>>,
}

impl InMemoryProcessedEvents {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProcessedEvents for InMemoryProcessedEvents {
    async fn is_processed(&self, event_id: Uuid) -> Result<bool, RepoError> {
        Ok(self
            .seen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&event_id))
    }

    async fn mark_processed(&self, event_id: Uuid, _event_type: &str) -> Result<(), RepoError> {
        self.seen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(event_id);
        Ok(())
    }
}

pub struct PgProcessedEvents {
    pool: PgPool,
}

impl PgProcessedEvents {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProcessedEvents for PgProcessedEvents {
    async fn is_processed(&self, event_id: Uuid) -> Result<bool, RepoError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM processed_events WHERE event_id = $1)",
        )
        .bind(event_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn mark_processed(&self, event_id: Uuid, event_type: &str) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO processed_events (event_id, event_type)
            VALUES ($1, $2)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(event_type)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{NoteRepository, RepoError};
use crate::models::{Note, NoteUpdate};

const NOTE_COLUMNS: &str = "id, title, content, user_id, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct NoteRow {
    id: String,
    title: String,
    content: String,
    user_id: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<NoteRow> for Note {
    fn from(row: NoteRow) -> Self {
        Note {
            id: row.id,
            title: row.title,
            content: row.content,
            user_id: row.user_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

fn map_write_error(e: sqlx::Error) -> RepoError {
    if let Some(db_err) = e.as_database_error() {
        if db_err.is_unique_violation() {
            return RepoError::Conflict(db_err.message().to_string());
        }
    }
    RepoError::Database(e)
}

pub struct PgNoteRepository {
    pool: PgPool,
}

impl PgNoteRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NoteRepository for PgNoteRepository {
    async fn create(&self, note: Note) -> Result<Note, RepoError> {
        let row = sqlx::query_as::<_, NoteRow>(&format!(
            r#"
            INSERT INTO notes (id, title, content, user_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {NOTE_COLUMNS}
            "#
        ))
        .bind(&note.id)
        .bind(&note.title)
        .bind(&note.content)
        .bind(&note.user_id)
        .bind(note.created_at)
        .bind(note.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_write_error)?;

        Ok(row.into())
    }

    async fn get(&self, id: &str) -> Result<Option<Note>, RepoError> {
        let row = sqlx::query_as::<_, NoteRow>(&format!(
            "SELECT {NOTE_COLUMNS} FROM notes WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn list_by_owner(&self, user_id: &str) -> Result<Vec<Note>, RepoError> {
        let rows = sqlx::query_as::<_, NoteRow>(&format!(
            "SELECT {NOTE_COLUMNS} FROM notes WHERE user_id = $1 ORDER BY created_at, id"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn update(&self, id: &str, changes: NoteUpdate) -> Result<Option<Note>, RepoError> {
        let row = sqlx::query_as::<_, NoteRow>(&format!(
            r#"
            UPDATE notes SET
                title      = COALESCE($2, title),
                content    = COALESCE($3, content),
                updated_at = now()
            WHERE id = $1
            RETURNING {NOTE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(changes.title)
        .bind(changes.content)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn delete(&self, id: &str) -> Result<bool, RepoError> {
        let result = sqlx::query("DELETE FROM notes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<(), RepoError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

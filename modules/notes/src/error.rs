use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::repos::RepoError;

#[derive(Debug, thiserror::Error)]
pub enum NoteError {
    #[error("note not found")]
    NotFound,

    #[error("{0}")]
    Validation(String),

    #[error("not authenticated")]
    Unauthorized,

    #[error("not enough permissions")]
    Forbidden,

    #[error(transparent)]
    Repository(#[from] RepoError),
}

impl NoteError {
    pub fn status(&self) -> StatusCode {
        match self {
            NoteError::NotFound => StatusCode::NOT_FOUND,
            NoteError::Validation(_) => StatusCode::BAD_REQUEST,
            NoteError::Unauthorized => StatusCode::UNAUTHORIZED,
            NoteError::Forbidden => StatusCode::FORBIDDEN,
            NoteError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for NoteError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        let body = Json(ErrorResponse {
            error: self.to_string(),
        });
        (status, body).into_response()
    }
}

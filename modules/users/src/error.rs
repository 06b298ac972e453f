use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::repos::RepoError;

#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error("user not found")]
    NotFound,

    #[error("{0}")]
    Validation(String),

    #[error("username already registered")]
    DuplicateUsername,

    #[error("user {0} already exists")]
    AlreadyExists(String),

    #[error("incorrect username or password")]
    InvalidCredentials,

    #[error("not authenticated")]
    Unauthorized,

    #[error("not enough permissions")]
    Forbidden,

    #[error("password hashing failed: {0}")]
    PasswordHash(String),

    #[error("token error: {0}")]
    Token(String),

    #[error(transparent)]
    Repository(#[from] RepoError),
}

impl UserError {
    pub fn status(&self) -> StatusCode {
        match self {
            UserError::NotFound => StatusCode::NOT_FOUND,
            UserError::Validation(_) => StatusCode::BAD_REQUEST,
            UserError::DuplicateUsername | UserError::AlreadyExists(_) => StatusCode::CONFLICT,
            UserError::InvalidCredentials | UserError::Unauthorized => StatusCode::UNAUTHORIZED,
            UserError::Forbidden => StatusCode::FORBIDDEN,
            UserError::PasswordHash(_) | UserError::Token(_) | UserError::Repository(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for UserError {
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

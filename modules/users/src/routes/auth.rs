use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::container::AppContainer;
use crate::error::UserError;
use crate::models::{LoginRequest, TokenResponse, User, UserCreate};

/// Self-registration. A password is mandatory here and the role is always
/// `user`; admins are promoted through `PUT /api/users/{id}`.
pub async fn register(
    State(state): State<Arc<AppContainer>>,
    Json(mut req): Json<UserCreate>,
) -> Result<(StatusCode, Json<User>), UserError> {
    if req.password.as_deref().map_or(true, str::is_empty) {
        return Err(UserError::Validation("password is required".to_string()));
    }
    req.role = None;

    let user = state.manager.register_user(req).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn login(
    State(state): State<Arc<AppContainer>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, UserError> {
    let user = state
        .manager
        .authenticate_user(&req.username, &req.password)
        .await?;

    let ttl = state.config.access_token_ttl_minutes;
    let access_token = state
        .jwt
        .sign_access_token(&user, ttl)
        .map_err(UserError::Token)?;

    tracing::info!(user_id = %user.id, "Issued access token");
    Ok(Json(TokenResponse {
        access_token,
        token_type: "Bearer",
        expires_in_seconds: ttl * 60,
    }))
}

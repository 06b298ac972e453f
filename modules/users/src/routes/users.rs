use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use super::current_user::CurrentUser;
use crate::container::AppContainer;
use crate::error::UserError;
use crate::models::{PasswordChange, PasswordReset, User, UserUpdate};

pub async fn list_users(
    State(state): State<Arc<AppContainer>>,
    current: CurrentUser,
) -> Result<Json<Vec<User>>, UserError> {
    current.ensure_admin()?;
    Ok(Json(state.manager.list_users().await?))
}

pub async fn me(current: CurrentUser) -> Json<User> {
    Json(current.0)
}

pub async fn change_my_password(
    State(state): State<Arc<AppContainer>>,
    current: CurrentUser,
    Json(req): Json<PasswordChange>,
) -> Result<StatusCode, UserError> {
    let user = current.0;
    state
        .manager
        .authenticate_user(&user.username, &req.current_password)
        .await?;

    let update = UserUpdate {
        password: Some(req.new_password),
        ..Default::default()
    };
    state.manager.update_user(&user.id, update).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_user(
    State(state): State<Arc<AppContainer>>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<User>, UserError> {
    current.ensure_self_or_admin(&id)?;
    Ok(Json(state.manager.get_user(&id).await?))
}

pub async fn update_user(
    State(state): State<Arc<AppContainer>>,
    current: CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<UserUpdate>,
) -> Result<Json<User>, UserError> {
    current.ensure_self_or_admin(&id)?;
    if req.role.is_some() {
        current.ensure_admin()?;
    }
    Ok(Json(state.manager.update_user(&id, req).await?))
}

pub async fn delete_user(
    State(state): State<Arc<AppContainer>>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode, UserError> {
    current.ensure_self_or_admin(&id)?;
    state.manager.delete_user(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Admin-only; the way replayed users get credentials
pub async fn reset_password(
    State(state): State<Arc<AppContainer>>,
    current: CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<PasswordReset>,
) -> Result<StatusCode, UserError> {
    current.ensure_admin()?;
    let update = UserUpdate {
        password: Some(req.new_password),
        ..Default::default()
    };
    state.manager.update_user(&id, update).await?;
    Ok(StatusCode::NO_CONTENT)
}

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::auth::AuthUser;
use crate::container::AppContainer;
use crate::error::NoteError;
use crate::models::{Note, NoteCreate, NoteUpdate};

/// Load a note the caller owns
async fn owned_note(state: &AppContainer, user: &AuthUser, id: &str) -> Result<Note, NoteError> {
    let note = state.manager.get_note(id).await?;
    if note.user_id != user.user_id {
        return Err(NoteError::Forbidden);
    }
    Ok(note)
}

pub async fn create_note(
    State(state): State<Arc<AppContainer>>,
    user: AuthUser,
    Json(req): Json<NoteCreate>,
) -> Result<(StatusCode, Json<Note>), NoteError> {
    let note = state.manager.create_note(req, &user.user_id).await?;
    Ok((StatusCode::CREATED, Json(note)))
}

pub async fn list_notes(
    State(state): State<Arc<AppContainer>>,
    user: AuthUser,
) -> Result<Json<Vec<Note>>, NoteError> {
    Ok(Json(state.manager.get_notes_by_user(&user.user_id).await?))
}

pub async fn get_note(
    State(state): State<Arc<AppContainer>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Note>, NoteError> {
    Ok(Json(owned_note(&state, &user, &id).await?))
}

pub async fn update_note(
    State(state): State<Arc<AppContainer>>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<NoteUpdate>,
) -> Result<Json<Note>, NoteError> {
    owned_note(&state, &user, &id).await?;
    Ok(Json(state.manager.update_note(&id, req).await?))
}

pub async fn delete_note(
    State(state): State<Arc<AppContainer>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, NoteError> {
    owned_note(&state, &user, &id).await?;
    state.manager.delete_note(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

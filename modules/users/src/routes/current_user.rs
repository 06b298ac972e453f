use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use std::sync::Arc;

use crate::container::AppContainer;
use crate::error::UserError;
use crate::models::User;

/// The user named by a valid `Authorization: Bearer` access token.
///
/// The token is only trusted for the id; the record is reloaded so a deleted
/// user or a changed role takes effect immediately.
pub struct CurrentUser(pub User);

impl FromRequestParts<Arc<AppContainer>> for CurrentUser {
    type Rejection = UserError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppContainer>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(UserError::Unauthorized)?;

        let claims = state.jwt.validate_access_token(token).map_err(|e| {
            tracing::debug!(error = %e, "Rejected access token");
            UserError::Unauthorized
        })?;

        match state.manager.get_user(&claims.sub).await {
            Ok(user) => Ok(CurrentUser(user)),
            Err(UserError::NotFound) => Err(UserError::Unauthorized),
            Err(e) => Err(e),
        }
    }
}

impl CurrentUser {
    /// Allow the user themselves or an admin
    pub fn ensure_self_or_admin(&self, id: &str) -> Result<(), UserError> {
        if self.0.id == id || self.0.is_admin() {
            Ok(())
        } else {
            Err(UserError::Forbidden)
        }
    }

    pub fn ensure_admin(&self) -> Result<(), UserError> {
        if self.0.is_admin() {
            Ok(())
        } else {
            Err(UserError::Forbidden)
        }
    }
}

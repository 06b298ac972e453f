//! Bearer token verification
//!
//! Tokens are issued by the users service; notes only verifies them with the
//! shared HS256 secret and trusts `sub` as the caller's user id.

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::sync::Arc;

use crate::container::AppContainer;
use crate::error::NoteError;

/// Issuer claim the users service stamps on access tokens
pub const ISSUER: &str = "users-rs";

#[derive(Debug, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    pub username: String,
    pub role: String,
    pub exp: i64,
}

#[derive(Clone)]
pub struct TokenVerifier {
    decoding: DecodingKey,
}

impl TokenVerifier {
    pub fn from_secret(secret: &str) -> Self {
        Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn verify(&self, token: &str) -> Result<AccessClaims, String> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[ISSUER]);

        jsonwebtoken::decode::<AccessClaims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| e.to_string())
    }
}

/// Caller identity taken from a valid access token
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub username: String,
}

impl FromRequestParts<Arc<AppContainer>> for AuthUser {
    type Rejection = NoteError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppContainer>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(NoteError::Unauthorized)?;

        let claims = state.tokens.verify(token).map_err(|e| {
            tracing::debug!(error = %e, "Rejected access token");
            NoteError::Unauthorized
        })?;

        Ok(AuthUser {
            user_id: claims.sub,
            username: claims.username,
        })
    }
}

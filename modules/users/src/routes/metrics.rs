use axum::{extract::State, http::StatusCode, response::IntoResponse};
use std::sync::Arc;

use crate::container::AppContainer;

pub async fn metrics(State(state): State<Arc<AppContainer>>) -> impl IntoResponse {
    match state.metrics.render() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

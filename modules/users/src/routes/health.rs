use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::container::AppContainer;

pub async fn health_live() -> StatusCode {
    StatusCode::OK
}

pub async fn health_ready(
    State(state): State<Arc<AppContainer>>,
) -> Result<Json<Value>, StatusCode> {
    let store_ok = state.repo.ping().await.is_ok();
    state
        .metrics
        .dep_up
        .with_label_values(&["store"])
        .set(if store_ok { 1 } else { 0 });

    let broker_ok = state.bus.is_connected();
    state
        .metrics
        .dep_up
        .with_label_values(&["broker"])
        .set(if broker_ok { 1 } else { 0 });

    if !(store_ok && broker_ok) {
        state.metrics.dep_up.with_label_values(&["ready"]).set(0);
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    state.metrics.dep_up.with_label_values(&["ready"]).set(1);

    Ok(Json(json!({
        "status": "ready",
        "store": "connected",
        "broker": "connected"
    })))
}

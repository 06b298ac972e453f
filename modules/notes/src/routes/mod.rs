pub mod health;
pub mod metrics;
pub mod notes;

use axum::{middleware::from_fn_with_state, routing::get, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::container::AppContainer;
use crate::middleware::metrics::metrics_middleware;

pub fn router(state: Arc<AppContainer>) -> Router {
    let health_router = Router::new()
        .route("/health/live", get(health::health_live))
        .route("/health/ready", get(health::health_ready))
        .route("/metrics", get(metrics::metrics));

    let api_router = Router::new()
        .route("/api/notes", get(notes::list_notes).post(notes::create_note))
        .route(
            "/api/notes/{id}",
            get(notes::get_note)
                .put(notes::update_note)
                .delete(notes::delete_note),
        );

    Router::new()
        .merge(health_router)
        .merge(api_router)
        .layer(from_fn_with_state(state.clone(), metrics_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

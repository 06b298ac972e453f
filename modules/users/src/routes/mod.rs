pub mod auth;
pub mod current_user;
pub mod health;
pub mod metrics;
pub mod users;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Router,
};
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
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/users", get(users::list_users))
        .route("/api/users/me", get(users::me))
        .route("/api/users/me/password", put(users::change_my_password))
        .route(
            "/api/users/{id}",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        .route("/api/users/{id}/reset-password", put(users::reset_password));

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

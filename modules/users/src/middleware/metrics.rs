use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::Request,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::time::Instant;

use crate::container::AppContainer;

/// Count and time every request, labelled by route template
pub async fn metrics_middleware(
    State(state): State<Arc<AppContainer>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let method = req.method().to_string();
    // Route template keeps label cardinality bounded (`/api/users/{id}`)
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let start = Instant::now();
    let res = next.run(req).await;
    let status = res.status().as_u16().to_string();

    state
        .metrics
        .http_requests_total
        .with_label_values(&[method.as_str(), path.as_str(), status.as_str()])
        .inc();
    state
        .metrics
        .http_request_duration_seconds
        .with_label_values(&[path.as_str(), method.as_str(), status.as_str()])
        .observe(start.elapsed().as_secs_f64());

    res
}

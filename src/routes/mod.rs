pub mod health;
pub mod push;

use std::sync::Arc;

use axum::{routing::get, Router};
use http::{header, Method};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::middleware;
use crate::AppState;

/// Assemble the full application around the given `/api` router.
///
/// `main` passes the API router wrapped in its rate limiter; tests pass it bare.
pub fn app(state: Arc<AppState>, api: Router<Arc<AppState>>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Push token registration and notification dispatch
        .nest("/api", api)
        .with_state(state)
        .layer(axum::middleware::from_fn(
            middleware::security_headers::security_headers_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]),
        )
}

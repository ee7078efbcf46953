//! Axum router setup.

use crate::config::RelayConfig;
use crate::handlers::documents;
use crate::rate_limit::RateLimiter;
use crate::storage::RelayStorage;
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub storage: RelayStorage,
    pub limiter: RateLimiter,
}

pub fn build_router(state: AppState, config: &RelayConfig) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/{*path}",
            get(documents::get_document)
                .put(documents::put_document)
                .delete(documents::delete_document),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(config.max_payload_size))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

//! API module
//!
//! HTTP API endpoints and middleware.

mod extract;
pub mod middleware;
pub mod routes;

use axum::{middleware as axum_middleware, routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::handlers::LedgerEngine;
use crate::store::LedgerStore;

pub use routes::create_router;

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

/// Full application: `/health` plus the actor-scoped API under `/api/v1`
pub fn build_app<S: LedgerStore>(engine: LedgerEngine<S>) -> Router {
    // Layers run outermost first: actor -> logging -> handler
    let protected_routes = create_router::<S>()
        .layer(axum_middleware::from_fn(middleware::logging_middleware))
        .layer(axum_middleware::from_fn(middleware::actor_middleware));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", protected_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}

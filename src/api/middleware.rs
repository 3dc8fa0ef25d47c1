//! API Middleware
//!
//! Actor resolution and request logging. Authentication happens upstream; this
//! service trusts the `X-Request-User-Id` header it is handed.

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use uuid::Uuid;

use crate::domain::OperationContext;
use crate::error::AppError;

pub const ACTOR_HEADER: &str = "X-Request-User-Id";
pub const CORRELATION_HEADER: &str = "X-Correlation-Id";

/// Parse the actor id, `None` when absent or malformed
fn actor_from_headers(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
}

/// Build the request's `OperationContext` from its headers
pub async fn actor_middleware(mut request: Request<Body>, next: Next) -> Response {
    let Some(actor_id) = actor_from_headers(request.headers()) else {
        return AppError::MissingActor.into_response();
    };

    // Reuse the caller's correlation id or start a new one
    let correlation_id = request
        .headers()
        .get(CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);

    let mut context = OperationContext::new(actor_id).with_correlation_id(correlation_id);
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        context = context.with_client_ip(addr.ip());
    }

    request.extensions_mut().insert(context);

    let mut response = next.run(request).await;
    if let Ok(value) = correlation_id.to_string().parse() {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }
    response
}

/// Headers that should be masked in logs
const SENSITIVE_HEADERS: &[&str] = &[
    "x-api-key",
    "authorization",
    "cookie",
    "set-cookie",
];

/// Mask sensitive headers for logging
pub fn mask_headers_for_logging(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let name_lower = name.as_str().to_lowercase();
            let masked_value = if SENSITIVE_HEADERS.contains(&name_lower.as_str()) {
                "[REDACTED]".to_string()
            } else {
                value.to_str().unwrap_or("[invalid utf8]").to_string()
            };
            (name.to_string(), masked_value)
        })
        .collect()
}

/// Request logging middleware
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    let headers = mask_headers_for_logging(request.headers());

    let (actor_id, correlation_id) = request
        .extensions()
        .get::<OperationContext>()
        .map(|ctx| (Some(ctx.actor_id), ctx.correlation_id))
        .unwrap_or((None, None));

    let start = std::time::Instant::now();

    tracing::debug!(
        method = %method,
        uri = %uri,
        actor_id = ?actor_id,
        correlation_id = ?correlation_id,
        headers = ?headers,
        "Incoming request"
    );

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status();

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %status,
        duration_ms = %duration.as_millis(),
        actor_id = ?actor_id,
        correlation_id = ?correlation_id,
        "Request completed"
    );

    response
}

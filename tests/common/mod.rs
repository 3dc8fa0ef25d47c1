//! Common test utilities

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use tower::util::ServiceExt;
use uuid::Uuid;

use ledger_engine::{api, LedgerEngine, MemoryStore};

const MIGRATION: &str = include_str!("../../migrations/20260101000000_ledger_core.sql");

/// Engine over a fresh in-memory store
pub fn memory_engine() -> LedgerEngine<MemoryStore> {
    LedgerEngine::new(MemoryStore::new())
}

/// Full HTTP app over a fresh in-memory store
pub fn memory_app() -> (Router, LedgerEngine<MemoryStore>) {
    let engine = memory_engine();
    (api::build_app(engine.clone()), engine)
}

/// Send one request as `actor` and decode the JSON response
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    actor: Option<Uuid>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(actor) = actor {
        builder = builder.header("X-Request-User-Id", actor.to_string());
    }
    let body = match body {
        Some(json) => Body::from(json.to_string()),
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    (status, json)
}

/// Read a decimal field that may be encoded as a string or a number
pub fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().unwrap(),
        other => other.to_string().parse().unwrap(),
    }
}

/// Connect to `DATABASE_URL` and apply the schema, `None` when unset
pub async fn pg_pool() -> Option<PgPool> {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").ok()?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    pool.execute(MIGRATION)
        .await
        .expect("Failed to apply schema");

    Some(pool)
}

//! Error handling module
//!
//! HTTP-facing error type and its response conversion. Every ledger outcome
//! keeps its own `error_code`, so callers can tell business rejections apart.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::LedgerError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Missing or invalid X-Request-User-Id header")]
    MissingActor,

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::InvalidRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::InvalidRequest(rejection.body_text())
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub retryable: bool,
}

fn ledger_status(err: &LedgerError) -> StatusCode {
    match err {
        // 400 Bad Request
        LedgerError::InvalidAmount(_)
        | LedgerError::InvalidRequest(_)
        | LedgerError::SelfTransfer => StatusCode::BAD_REQUEST,

        // 403 Forbidden
        LedgerError::AccessDenied => StatusCode::FORBIDDEN,

        // 404 Not Found
        LedgerError::WalletNotFound(_)
        | LedgerError::TransactionNotFound(_)
        | LedgerError::InvoiceNotFound(_) => StatusCode::NOT_FOUND,

        // 409 Conflict: the record is in a state that forbids the change
        LedgerError::AlreadyPaid(_)
        | LedgerError::InvoiceCancelled(_)
        | LedgerError::CannotCancelPaid(_)
        | LedgerError::InvalidTransition { .. } => StatusCode::CONFLICT,

        // 422 Unprocessable: the wallet cannot take this leg
        LedgerError::InsufficientFunds { .. } | LedgerError::CurrencyMismatch { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }

        // 423 Locked
        LedgerError::WalletLocked(_) => StatusCode::LOCKED,

        // 503 when a retry may succeed, 500 otherwise
        LedgerError::Timeout => StatusCode::SERVICE_UNAVAILABLE,
        LedgerError::Store(store_err) if store_err.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
        LedgerError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, details, retryable) = match &self {
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone()), false)
            }
            AppError::MissingActor => (StatusCode::UNAUTHORIZED, "missing_actor", None, false),
            AppError::Ledger(err) => {
                if !err.is_client_error() {
                    tracing::error!(error = %err, "Ledger infrastructure error");
                }
                (ledger_status(err), err.code(), None, err.is_retryable())
            }
        };

        // Infrastructure details stay in the logs
        let error = if status.is_server_error() {
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            error,
            error_code: error_code.to_string(),
            details,
            retryable,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    #[test]
    fn test_business_errors_have_distinct_statuses() {
        assert_eq!(
            ledger_status(&LedgerError::insufficient_funds(dec!(10), dec!(5))),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ledger_status(&LedgerError::WalletLocked(Uuid::new_v4())),
            StatusCode::LOCKED
        );
        assert_eq!(
            ledger_status(&LedgerError::AlreadyPaid(Uuid::new_v4())),
            StatusCode::CONFLICT
        );
        assert_eq!(ledger_status(&LedgerError::AccessDenied), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_retryable_store_errors_are_unavailable() {
        assert_eq!(
            ledger_status(&LedgerError::Store(StoreError::LockTimeout)),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ledger_status(&LedgerError::Store(StoreError::Corrupt("x".into()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_invalid_request_is_bad_request() {
        let response = AppError::InvalidRequest("missing field `amount`".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_missing_actor_is_unauthorized() {
        let response = AppError::MissingActor.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}

//! Ledger Error Types
//!
//! Every outcome an engine operation can fail with. Business-rule variants are
//! expected, caller-visible results and must stay distinct from each other;
//! store failures are wrapped and classified as retryable.

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use super::{AmountError, Currency, CurrencyError};
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum LedgerError {
    // Validation errors, raised before any store access
    /// Zero, negative, malformed or out-of-range amount
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Malformed request that is not about the amount
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Transfer or payment to the initiating account
    #[error("Cannot transfer to the same account")]
    SelfTransfer,

    // Business-rule errors, raised inside a unit of work
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Decimal, available: Decimal },

    #[error("Wallet is locked: {0}")]
    WalletLocked(Uuid),

    #[error("Currency mismatch: wallet holds {expected}, operation uses {found}")]
    CurrencyMismatch { expected: Currency, found: Currency },

    #[error("Invoice already paid: {0}")]
    AlreadyPaid(Uuid),

    #[error("Invoice is cancelled: {0}")]
    InvoiceCancelled(Uuid),

    #[error("Cannot cancel paid invoice: {0}")]
    CannotCancelPaid(Uuid),

    #[error("Access denied")]
    AccessDenied,

    #[error("Invalid {entity} status transition: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("Wallet not found: {0}")]
    WalletNotFound(Uuid),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(Uuid),

    #[error("Invoice not found: {0}")]
    InvoiceNotFound(Uuid),

    // Infrastructure errors, the unit of work has been rolled back
    #[error("Unit of work exceeded its deadline")]
    Timeout,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LedgerError {
    pub fn insufficient_funds(required: Decimal, available: Decimal) -> Self {
        Self::InsufficientFunds {
            required,
            available,
        }
    }

    pub fn invalid_transition(
        entity: &'static str,
        from: impl ToString,
        to: impl ToString,
    ) -> Self {
        Self::InvalidTransition {
            entity,
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Stable machine-readable code for this outcome
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidAmount(_) => "invalid_amount",
            Self::InvalidRequest(_) => "invalid_request",
            Self::SelfTransfer => "self_transfer",
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::WalletLocked(_) => "wallet_locked",
            Self::CurrencyMismatch { .. } => "currency_mismatch",
            Self::AlreadyPaid(_) => "already_paid",
            Self::InvoiceCancelled(_) => "invoice_cancelled",
            Self::CannotCancelPaid(_) => "cannot_cancel_paid",
            Self::AccessDenied => "access_denied",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::WalletNotFound(_) => "wallet_not_found",
            Self::TransactionNotFound(_) => "transaction_not_found",
            Self::InvoiceNotFound(_) => "invoice_not_found",
            Self::Timeout => "timeout",
            Self::Store(_) => "store_error",
        }
    }

    /// Check if this is a client error (validation or business rule)
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Timeout | Self::Store(_))
    }

    /// Check if the caller may retry the whole operation
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout => true,
            Self::Store(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl From<AmountError> for LedgerError {
    fn from(err: AmountError) -> Self {
        Self::InvalidAmount(err.to_string())
    }
}

impl From<CurrencyError> for LedgerError {
    fn from(err: CurrencyError) -> Self {
        Self::InvalidRequest(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_insufficient_funds_error() {
        let err = LedgerError::insufficient_funds(dec!(100), dec!(50));

        assert!(err.is_client_error());
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("100"));
        assert!(err.to_string().contains("50"));
        assert_eq!(err.code(), "insufficient_funds");
    }

    #[test]
    fn test_timeout_is_retryable() {
        let err = LedgerError::Timeout;
        assert!(!err.is_client_error());
        assert!(err.is_retryable());
    }

    #[test]
    fn test_store_lock_timeout_is_retryable() {
        let err = LedgerError::from(StoreError::LockTimeout);
        assert!(err.is_retryable());
        assert_eq!(err.code(), "store_error");
    }

    #[test]
    fn test_amount_error_maps_to_invalid_amount() {
        let err = LedgerError::from(AmountError::NotPositive(Decimal::ZERO));
        assert!(matches!(err, LedgerError::InvalidAmount(_)));
    }
}

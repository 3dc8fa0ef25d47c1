//! Command definitions
//!
//! Commands represent intentions to change the ledger. Amounts travel as
//! strings so no precision is lost before the engine validates them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Invoice, Transaction, Wallet};

/// Move funds between two accounts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferCommand {
    pub from_account_id: Uuid,
    pub to_account_id: Uuid,
    pub amount: String,
    /// Engine default currency when absent
    pub currency: Option<String>,
    pub description: Option<String>,
}

impl TransferCommand {
    pub fn new(from_account_id: Uuid, to_account_id: Uuid, amount: impl Into<String>) -> Self {
        Self {
            from_account_id,
            to_account_id,
            amount: amount.into(),
            currency: None,
            description: None,
        }
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Pay a merchant. Same legs as a transfer, recorded as a payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentCommand {
    pub payer_id: Uuid,
    pub merchant_id: Uuid,
    pub amount: String,
    pub currency: Option<String>,
    pub description: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl PaymentCommand {
    pub fn new(payer_id: Uuid, merchant_id: Uuid, amount: impl Into<String>) -> Self {
        Self {
            payer_id,
            merchant_id,
            amount: amount.into(),
            currency: None,
            description: None,
            metadata: None,
        }
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettleInvoiceCommand {
    pub invoice_id: Uuid,
    pub payer_id: Uuid,
}

/// Credit (top-up) or debit (withdraw) one account against the outside world
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletMovementCommand {
    pub account_id: Uuid,
    pub amount: String,
    pub currency: Option<String>,
    pub description: Option<String>,
}

impl WalletMovementCommand {
    pub fn new(account_id: Uuid, amount: impl Into<String>) -> Self {
        Self {
            account_id,
            amount: amount.into(),
            currency: None,
            description: None,
        }
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }
}

pub type TopUpCommand = WalletMovementCommand;
pub type WithdrawCommand = WalletMovementCommand;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateInvoiceCommand {
    pub merchant_id: Uuid,
    pub amount: String,
    pub currency: Option<String>,
    pub customer_id: Option<Uuid>,
    pub description: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
}

impl CreateInvoiceCommand {
    pub fn new(merchant_id: Uuid, amount: impl Into<String>) -> Self {
        Self {
            merchant_id,
            amount: amount.into(),
            currency: None,
            customer_id: None,
            description: None,
            due_date: None,
        }
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    pub fn with_customer(mut self, customer_id: Uuid) -> Self {
        self.customer_id = Some(customer_id);
        self
    }

    pub fn with_due_date(mut self, due_date: DateTime<Utc>) -> Self {
        self.due_date = Some(due_date);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateInvoiceCommand {
    pub invoice_id: Uuid,
    pub merchant_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub amount: Option<String>,
    pub description: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelInvoiceCommand {
    pub invoice_id: Uuid,
    pub merchant_id: Uuid,
}

/// Result of a top-up or withdrawal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletMovement {
    pub wallet: Wallet,
    pub transaction: Transaction,
}

/// Result of a successful invoice settlement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settlement {
    pub transaction: Transaction,
    pub invoice: Invoice,
}

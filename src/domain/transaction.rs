//! Transaction records
//!
//! Append-only ledger entries. Only the status of a recorded transaction can
//! change after creation, and only along the status state machine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::page::{PageRequest, SortKey};
use super::{Amount, Currency, LedgerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Deposit,
    Withdraw,
    Transfer,
    Payment,
    #[serde(rename = "topup")]
    TopUp,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "deposit",
            TransactionType::Withdraw => "withdraw",
            TransactionType::Transfer => "transfer",
            TransactionType::Payment => "payment",
            TransactionType::TopUp => "topup",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(TransactionType::Deposit),
            "withdraw" => Ok(TransactionType::Withdraw),
            "transfer" => Ok(TransactionType::Transfer),
            "payment" => Ok(TransactionType::Payment),
            "topup" => Ok(TransactionType::TopUp),
            other => Err(LedgerError::InvalidRequest(format!(
                "unknown transaction type: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Refunded => "refunded",
        }
    }

    /// pending -> completed | failed, completed -> refunded
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, next),
            (Pending, Completed) | (Pending, Failed) | (Completed, Refunded)
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "completed" => Ok(TransactionStatus::Completed),
            "failed" => Ok(TransactionStatus::Failed),
            "refunded" => Ok(TransactionStatus::Refunded),
            other => Err(LedgerError::InvalidRequest(format!(
                "unknown transaction status: {}",
                other
            ))),
        }
    }
}

/// A recorded money movement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub from_account_id: Uuid,
    pub to_account_id: Option<Uuid>,
    pub amount: Amount,
    pub currency: Currency,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    pub description: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub fee: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Whether `account_id` is the source or destination
    pub fn involves(&self, account_id: Uuid) -> bool {
        self.from_account_id == account_id || self.to_account_id == Some(account_id)
    }

    /// Apply a status update, enforcing the state machine
    pub fn with_status(
        &self,
        update: TransactionStatusUpdate,
        now: DateTime<Utc>,
    ) -> Result<Transaction, LedgerError> {
        if !self.status.can_transition_to(update.status) {
            return Err(LedgerError::invalid_transition(
                "transaction",
                self.status,
                update.status,
            ));
        }
        Ok(Transaction {
            status: update.status,
            updated_at: now,
            ..self.clone()
        })
    }
}

/// Transaction to be appended to the ledger
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub id: Option<Uuid>,
    pub from_account_id: Uuid,
    pub to_account_id: Option<Uuid>,
    pub amount: Amount,
    pub currency: Currency,
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    pub description: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub fee: Decimal,
}

impl NewTransaction {
    /// A completed movement with no fee
    pub fn completed(
        transaction_type: TransactionType,
        from_account_id: Uuid,
        to_account_id: Option<Uuid>,
        amount: Amount,
        currency: Currency,
    ) -> Self {
        Self {
            id: None,
            from_account_id,
            to_account_id,
            amount,
            currency,
            transaction_type,
            status: TransactionStatus::Completed,
            description: None,
            metadata: None,
            fee: Decimal::ZERO,
        }
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Assign identity and timestamps
    pub fn into_transaction(self, now: DateTime<Utc>) -> Result<Transaction, LedgerError> {
        if self.fee < Decimal::ZERO {
            return Err(LedgerError::InvalidAmount(format!(
                "fee cannot be negative (got {})",
                self.fee
            )));
        }
        Ok(Transaction {
            id: self.id.unwrap_or_else(Uuid::new_v4),
            from_account_id: self.from_account_id,
            to_account_id: self.to_account_id,
            amount: self.amount,
            currency: self.currency,
            transaction_type: self.transaction_type,
            status: self.status,
            description: self.description,
            metadata: self.metadata,
            fee: self.fee,
            created_at: now,
            updated_at: now,
        })
    }
}

/// The only post-creation change a transaction accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionStatusUpdate {
    pub status: TransactionStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TransactionSort {
    #[default]
    CreatedAt,
    Amount,
    Type,
    Status,
}

impl SortKey for TransactionSort {
    fn column(&self) -> &'static str {
        match self {
            TransactionSort::CreatedAt => "created_at",
            TransactionSort::Amount => "amount",
            TransactionSort::Type => "transaction_type",
            TransactionSort::Status => "status",
        }
    }
}

impl FromStr for TransactionSort {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created_at" => Ok(TransactionSort::CreatedAt),
            "amount" => Ok(TransactionSort::Amount),
            "type" => Ok(TransactionSort::Type),
            "status" => Ok(TransactionSort::Status),
            other => Err(LedgerError::InvalidRequest(format!(
                "cannot sort transactions by {:?}",
                other
            ))),
        }
    }
}

/// Ledger query: an account's movements, optionally narrowed
#[derive(Debug, Clone)]
pub struct TransactionQuery {
    pub account_id: Uuid,
    pub transaction_type: Option<TransactionType>,
    pub status: Option<TransactionStatus>,
    pub page: PageRequest<TransactionSort>,
}

impl TransactionQuery {
    pub fn for_account(account_id: Uuid) -> Self {
        Self {
            account_id,
            transaction_type: None,
            status: None,
            page: PageRequest::default(),
        }
    }

    pub fn matches(&self, tx: &Transaction) -> bool {
        tx.involves(self.account_id)
            && self.transaction_type.map_or(true, |t| tx.transaction_type == t)
            && self.status.map_or(true, |s| tx.status == s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample() -> Transaction {
        NewTransaction::completed(
            TransactionType::Transfer,
            Uuid::new_v4(),
            Some(Uuid::new_v4()),
            Amount::new(dec!(40)).unwrap(),
            Currency::new("ETB").unwrap(),
        )
        .into_transaction(Utc::now())
        .unwrap()
    }

    #[test]
    fn test_status_state_machine() {
        use TransactionStatus::*;
        assert!(Pending.can_transition_to(Completed));
        assert!(Pending.can_transition_to(Failed));
        assert!(Completed.can_transition_to(Refunded));

        assert!(!Completed.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Completed));
        assert!(!Refunded.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Refunded));
    }

    #[test]
    fn test_refund_completed() {
        let tx = sample();
        let refunded = tx
            .with_status(
                TransactionStatusUpdate {
                    status: TransactionStatus::Refunded,
                },
                Utc::now(),
            )
            .unwrap();
        assert_eq!(refunded.status, TransactionStatus::Refunded);
        assert_eq!(refunded.amount, tx.amount);
        assert_eq!(refunded.id, tx.id);
    }

    #[test]
    fn test_invalid_transition_rejected() {
        let tx = sample();
        let result = tx.with_status(
            TransactionStatusUpdate {
                status: TransactionStatus::Pending,
            },
            Utc::now(),
        );
        assert!(matches!(result, Err(LedgerError::InvalidTransition { .. })));
    }

    #[test]
    fn test_generated_id_and_explicit_id() {
        let explicit = Uuid::new_v4();
        let mut new_tx = NewTransaction::completed(
            TransactionType::TopUp,
            Uuid::new_v4(),
            None,
            Amount::new(dec!(5)).unwrap(),
            Currency::new("ETB").unwrap(),
        );
        new_tx.id = Some(explicit);
        assert_eq!(new_tx.into_transaction(Utc::now()).unwrap().id, explicit);
    }

    #[test]
    fn test_negative_fee_rejected() {
        let mut new_tx = NewTransaction::completed(
            TransactionType::Payment,
            Uuid::new_v4(),
            Some(Uuid::new_v4()),
            Amount::new(dec!(5)).unwrap(),
            Currency::new("ETB").unwrap(),
        );
        new_tx.fee = dec!(-1);
        assert!(matches!(
            new_tx.into_transaction(Utc::now()),
            Err(LedgerError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_query_matches_either_side() {
        let tx = sample();
        let to = tx.to_account_id.unwrap();

        assert!(TransactionQuery::for_account(tx.from_account_id).matches(&tx));
        assert!(TransactionQuery::for_account(to).matches(&tx));
        assert!(!TransactionQuery::for_account(Uuid::new_v4()).matches(&tx));

        let mut query = TransactionQuery::for_account(to);
        query.transaction_type = Some(TransactionType::Payment);
        assert!(!query.matches(&tx));
    }

    #[test]
    fn test_type_round_trips_through_str() {
        assert_eq!("topup".parse::<TransactionType>().unwrap(), TransactionType::TopUp);
        assert_eq!(TransactionType::TopUp.to_string(), "topup");
        assert!("refund".parse::<TransactionType>().is_err());
    }
}

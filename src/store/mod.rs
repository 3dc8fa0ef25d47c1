//! Ledger stores
//!
//! Record stores for wallets, transactions and invoices, and the unit of work
//! that groups their mutations. Rows touched through a unit of work stay
//! exclusively locked until it commits or is dropped; dropping without commit
//! rolls everything back.
//!
//! Backends implement the storage primitives. The balance, status and
//! settlement rules are default methods here so both backends enforce them
//! identically while holding the row lock.

mod error;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use uuid::Uuid;

use crate::domain::{
    format_invoice_number, BalanceDelta, Currency, Invoice, InvoiceQuery, InvoiceStats,
    InvoiceStatus, LedgerError, NewInvoice, NewTransaction, Page, Transaction, TransactionQuery,
    TransactionStatusUpdate, Wallet,
};

pub use error::StoreError;
pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait WalletRepository: Send {
    /// Fetch the wallet, creating an empty one in `currency` if the account
    /// has none, and hold its lock for the rest of the unit of work.
    async fn lock_wallet(&mut self, account_id: Uuid, currency: &Currency)
        -> Result<Wallet, StoreError>;

    /// Lock an existing wallet
    async fn find_wallet_for_update(&mut self, account_id: Uuid)
        -> Result<Option<Wallet>, StoreError>;

    /// Persist a wallet this unit of work holds the lock for
    async fn write_wallet(&mut self, wallet: &Wallet) -> Result<(), StoreError>;

    /// Apply one leg to a wallet under its lock
    async fn mutate_balance(
        &mut self,
        account_id: Uuid,
        currency: &Currency,
        delta: BalanceDelta,
    ) -> Result<Wallet, LedgerError> {
        let wallet = self.lock_wallet(account_id, currency).await?;
        let updated = wallet.apply(currency, delta, Utc::now())?;
        self.write_wallet(&updated).await?;
        Ok(updated)
    }

    /// Toggle the lock flag of an existing wallet
    async fn set_wallet_locked(
        &mut self,
        account_id: Uuid,
        locked: bool,
    ) -> Result<Wallet, LedgerError> {
        let wallet = self
            .find_wallet_for_update(account_id)
            .await?
            .ok_or(LedgerError::WalletNotFound(account_id))?;
        let updated = wallet.with_locked(locked, Utc::now());
        self.write_wallet(&updated).await?;
        Ok(updated)
    }
}

#[async_trait]
pub trait TransactionRepository: Send {
    async fn insert_transaction(&mut self, transaction: &Transaction) -> Result<(), StoreError>;

    async fn find_transaction_for_update(&mut self, id: Uuid)
        -> Result<Option<Transaction>, StoreError>;

    async fn write_transaction_status(&mut self, transaction: &Transaction)
        -> Result<(), StoreError>;

    /// Append an immutable record, generating its id if absent
    async fn append_transaction(
        &mut self,
        new_transaction: NewTransaction,
    ) -> Result<Transaction, LedgerError> {
        let transaction = new_transaction.into_transaction(Utc::now())?;
        self.insert_transaction(&transaction).await?;
        Ok(transaction)
    }

    /// The only post-creation mutation of a transaction
    async fn update_transaction_status(
        &mut self,
        id: Uuid,
        update: TransactionStatusUpdate,
    ) -> Result<Transaction, LedgerError> {
        let current = self
            .find_transaction_for_update(id)
            .await?
            .ok_or(LedgerError::TransactionNotFound(id))?;
        let updated = current.with_status(update, Utc::now())?;
        self.write_transaction_status(&updated).await?;
        Ok(updated)
    }
}

#[async_trait]
pub trait InvoiceRepository: Send {
    /// Next value of the per-year invoice counter, starting at 1
    async fn next_invoice_sequence(&mut self, year: i32) -> Result<u64, StoreError>;

    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<(), StoreError>;

    async fn find_invoice_for_update(&mut self, id: Uuid) -> Result<Option<Invoice>, StoreError>;

    async fn write_invoice(&mut self, invoice: &Invoice) -> Result<(), StoreError>;

    async fn generate_invoice_number(&mut self, year: i32) -> Result<String, StoreError> {
        let sequence = self.next_invoice_sequence(year).await?;
        Ok(format_invoice_number(year, sequence))
    }

    async fn create_invoice(&mut self, new_invoice: NewInvoice) -> Result<Invoice, LedgerError> {
        let now = Utc::now();
        let number = self.generate_invoice_number(now.year()).await?;
        let invoice = new_invoice.into_invoice(number, now);
        self.insert_invoice(&invoice).await?;
        Ok(invoice)
    }

    async fn lock_invoice(&mut self, id: Uuid) -> Result<Invoice, LedgerError> {
        self.find_invoice_for_update(id)
            .await?
            .ok_or(LedgerError::InvoiceNotFound(id))
    }

    async fn update_invoice_status(
        &mut self,
        id: Uuid,
        status: InvoiceStatus,
    ) -> Result<Invoice, LedgerError> {
        let invoice = self.lock_invoice(id).await?;
        let updated = invoice.transition(status, Utc::now())?;
        self.write_invoice(&updated).await?;
        Ok(updated)
    }

    /// Link the settling transaction. The paid check and the write happen
    /// under the same row lock.
    async fn mark_invoice_paid(
        &mut self,
        id: Uuid,
        transaction_id: Uuid,
    ) -> Result<Invoice, LedgerError> {
        let invoice = self.lock_invoice(id).await?;
        let paid = invoice.mark_paid(transaction_id, Utc::now())?;
        self.write_invoice(&paid).await?;
        Ok(paid)
    }
}

/// A set of store mutations that commit or roll back together
#[async_trait]
pub trait UnitOfWork:
    WalletRepository + TransactionRepository + InvoiceRepository + Sized + Send
{
    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}

/// Lock the wallets of a multi-leg operation in ascending account order
pub async fn lock_wallets_in_order<U: WalletRepository + ?Sized>(
    uow: &mut U,
    accounts: &[Uuid],
    currency: &Currency,
) -> Result<Vec<Wallet>, StoreError> {
    let mut ordered = accounts.to_vec();
    ordered.sort();
    ordered.dedup();

    let mut wallets = Vec::with_capacity(ordered.len());
    for account_id in ordered {
        wallets.push(uow.lock_wallet(account_id, currency).await?);
    }
    Ok(wallets)
}

/// Invoices with a due date, narrowed by status and due window
#[derive(Debug, Clone)]
pub struct DueInvoiceFilter {
    pub statuses: Vec<InvoiceStatus>,
    /// Inclusive lower bound
    pub due_from: Option<DateTime<Utc>>,
    /// Exclusive upper bound
    pub due_before: Option<DateTime<Utc>>,
}

impl DueInvoiceFilter {
    pub fn matches(&self, invoice: &Invoice) -> bool {
        let Some(due_date) = invoice.due_date else {
            return false;
        };
        self.statuses.contains(&invoice.status)
            && self.due_from.map_or(true, |from| due_date >= from)
            && self.due_before.map_or(true, |before| due_date < before)
    }
}

/// Store handle: opens units of work and serves committed reads
#[async_trait]
pub trait LedgerStore: Clone + Send + Sync + 'static {
    type Uow: UnitOfWork + 'static;

    async fn begin(&self) -> Result<Self::Uow, StoreError>;

    async fn get_wallet(&self, account_id: Uuid) -> Result<Option<Wallet>, StoreError>;

    async fn get_transaction(&self, id: Uuid) -> Result<Option<Transaction>, StoreError>;

    async fn query_transactions(
        &self,
        query: &TransactionQuery,
    ) -> Result<Page<Transaction>, StoreError>;

    async fn get_invoice(&self, id: Uuid) -> Result<Option<Invoice>, StoreError>;

    async fn list_invoices(&self, query: &InvoiceQuery) -> Result<Page<Invoice>, StoreError>;

    async fn find_due_invoices(&self, filter: &DueInvoiceFilter)
        -> Result<Vec<Invoice>, StoreError>;

    async fn invoice_stats(&self, merchant_id: Uuid) -> Result<InvoiceStats, StoreError>;

    /// Open invoices whose due date is before `now`
    async fn find_overdue_invoices(&self, now: DateTime<Utc>) -> Result<Vec<Invoice>, StoreError> {
        self.find_due_invoices(&DueInvoiceFilter {
            statuses: vec![
                InvoiceStatus::Draft,
                InvoiceStatus::Sent,
                InvoiceStatus::Overdue,
            ],
            due_from: None,
            due_before: Some(now),
        })
        .await
    }
}

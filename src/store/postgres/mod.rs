//! Postgres store
//!
//! A unit of work is one database transaction. Rows are locked with
//! `SELECT ... FOR UPDATE` and the wait is bounded by `SET LOCAL lock_timeout`,
//! so a stuck lock surfaces as `StoreError::LockTimeout` instead of hanging.

mod invoices;
mod transactions;
mod wallets;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Duration;
use uuid::Uuid;

use super::{DueInvoiceFilter, LedgerStore, StoreError, UnitOfWork};
use crate::domain::{
    Invoice, InvoiceQuery, InvoiceStats, Page, Transaction as LedgerTransaction,
    TransactionQuery, Wallet,
};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(3);

/// Store backed by a Postgres pool
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Unit of work over one Postgres transaction. Dropping it without commit
/// rolls the transaction back.
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

fn to_count(value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative count {}", value)))
}

#[async_trait]
impl LedgerStore for PgStore {
    type Uow = PgUnitOfWork;

    async fn begin(&self) -> Result<PgUnitOfWork, StoreError> {
        let mut tx = self.pool.begin().await?;

        // SET does not take bind parameters
        let statement = format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout.as_millis()
        );
        sqlx::query(&statement).execute(&mut *tx).await?;

        Ok(PgUnitOfWork { tx })
    }

    async fn get_wallet(&self, account_id: Uuid) -> Result<Option<Wallet>, StoreError> {
        wallets::get_wallet(&self.pool, account_id).await
    }

    async fn get_transaction(&self, id: Uuid) -> Result<Option<LedgerTransaction>, StoreError> {
        transactions::get_transaction(&self.pool, id).await
    }

    async fn query_transactions(
        &self,
        query: &TransactionQuery,
    ) -> Result<Page<LedgerTransaction>, StoreError> {
        transactions::query_transactions(&self.pool, query).await
    }

    async fn get_invoice(&self, id: Uuid) -> Result<Option<Invoice>, StoreError> {
        invoices::get_invoice(&self.pool, id).await
    }

    async fn list_invoices(&self, query: &InvoiceQuery) -> Result<Page<Invoice>, StoreError> {
        invoices::list_invoices(&self.pool, query).await
    }

    async fn find_due_invoices(
        &self,
        filter: &DueInvoiceFilter,
    ) -> Result<Vec<Invoice>, StoreError> {
        invoices::find_due_invoices(&self.pool, filter).await
    }

    async fn invoice_stats(&self, merchant_id: Uuid) -> Result<InvoiceStats, StoreError> {
        invoices::invoice_stats(&self.pool, merchant_id).await
    }
}

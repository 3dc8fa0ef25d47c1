//! In-memory store
//!
//! Committed rows live in plain maps behind a short-lived mutex. Each row also
//! has an async lock; a unit of work holds the owned guard of every row it
//! touches and stages its writes, which become visible only on commit.
//! Committed reads never wait on row locks.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{Mutex as RowMutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{
    DueInvoiceFilter, InvoiceRepository, LedgerStore, StoreError, TransactionRepository,
    UnitOfWork, WalletRepository,
};
use crate::domain::{
    Currency, Invoice, InvoiceQuery, InvoiceSort, InvoiceStats, Page, SortOrder, Transaction,
    TransactionQuery, TransactionSort, Wallet,
};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(3);

type RowLock = Arc<RowMutex<()>>;

/// Committed rows of one entity plus their row locks
struct Table<T> {
    rows: HashMap<Uuid, T>,
    locks: HashMap<Uuid, RowLock>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: HashMap::new(),
            locks: HashMap::new(),
        }
    }
}

impl<T> Table<T> {
    fn lock_for(&mut self, id: Uuid) -> RowLock {
        self.locks.entry(id).or_default().clone()
    }

    /// Drop lock entries of ids that have no row and no other holder or waiter
    fn prune_locks(&mut self, ids: impl IntoIterator<Item = Uuid>) {
        for id in ids {
            if self.rows.contains_key(&id) {
                continue;
            }
            if self.locks.get(&id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
                self.locks.remove(&id);
            }
        }
    }
}

fn wallets(tables: &mut Tables) -> &mut Table<Wallet> {
    &mut tables.wallets
}

fn transactions(tables: &mut Tables) -> &mut Table<Transaction> {
    &mut tables.transactions
}

fn invoices(tables: &mut Tables) -> &mut Table<Invoice> {
    &mut tables.invoices
}

#[derive(Default)]
struct Tables {
    wallets: Table<Wallet>,
    transactions: Table<Transaction>,
    invoices: Table<Invoice>,
    invoice_sequences: HashMap<i32, u64>,
}

/// Store backed by process memory
#[derive(Clone)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    lock_timeout: Duration,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(Mutex::new(Tables::default())),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// How long a unit of work waits for a row lock before `LockTimeout`
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        lock_tables(&self.tables)
    }
}

fn lock_tables(tables: &Mutex<Tables>) -> Result<MutexGuard<'_, Tables>, StoreError> {
    tables
        .lock()
        .map_err(|_| StoreError::Corrupt("memory store mutex poisoned".to_string()))
}

/// A row this unit of work has touched
struct Held<T> {
    _guard: Option<OwnedMutexGuard<()>>,
    /// Staged view; `None` when the row does not exist
    row: Option<T>,
    dirty: bool,
}

/// Unit of work over a `MemoryStore`
pub struct MemoryUnitOfWork {
    tables: Arc<Mutex<Tables>>,
    lock_timeout: Duration,
    wallets: HashMap<Uuid, Held<Wallet>>,
    transactions: HashMap<Uuid, Held<Transaction>>,
    invoices: HashMap<Uuid, Held<Invoice>>,
}

impl MemoryUnitOfWork {
    async fn acquire(&self, lock: RowLock) -> Result<OwnedMutexGuard<()>, StoreError> {
        tokio::time::timeout(self.lock_timeout, lock.lock_owned())
            .await
            .map_err(|_| StoreError::LockTimeout)
    }

    /// Lock a row and load its committed value. The tables mutex is never
    /// held across the await.
    async fn hold<T: Clone>(
        &self,
        id: Uuid,
        table: fn(&mut Tables) -> &mut Table<T>,
    ) -> Result<Held<T>, StoreError> {
        let lock = {
            let mut tables = lock_tables(&self.tables)?;
            table(&mut tables).lock_for(id)
        };
        let guard = self.acquire(lock).await?;
        let row = {
            let mut tables = lock_tables(&self.tables)?;
            table(&mut tables).rows.get(&id).cloned()
        };
        Ok(Held {
            _guard: Some(guard),
            row,
            dirty: false,
        })
    }

    /// Release every row guard, then forget locks of ids that never became rows
    fn release(&mut self) {
        let wallet_ids: Vec<Uuid> = std::mem::take(&mut self.wallets).into_keys().collect();
        let transaction_ids: Vec<Uuid> =
            std::mem::take(&mut self.transactions).into_keys().collect();
        let invoice_ids: Vec<Uuid> = std::mem::take(&mut self.invoices).into_keys().collect();

        if let Ok(mut tables) = lock_tables(&self.tables) {
            tables.wallets.prune_locks(wallet_ids);
            tables.transactions.prune_locks(transaction_ids);
            tables.invoices.prune_locks(invoice_ids);
        }
    }

    fn stage<T: Clone>(held: &mut HashMap<Uuid, Held<T>>, id: Uuid, row: &T) -> Result<(), StoreError> {
        match held.get_mut(&id) {
            Some(entry) => {
                entry.row = Some(row.clone());
                entry.dirty = true;
                Ok(())
            }
            None => Err(StoreError::Conflict(format!(
                "write to row {} without holding its lock",
                id
            ))),
        }
    }

    fn stage_insert<T: Clone>(
        held: &mut HashMap<Uuid, Held<T>>,
        committed: &HashMap<Uuid, T>,
        id: Uuid,
        row: &T,
    ) -> Result<(), StoreError> {
        if committed.contains_key(&id) || held.contains_key(&id) {
            return Err(StoreError::Conflict(format!("duplicate id {}", id)));
        }
        held.insert(
            id,
            Held {
                _guard: None,
                row: Some(row.clone()),
                dirty: true,
            },
        );
        Ok(())
    }
}

/// Write dirty rows and release their guards; returns every touched id
fn apply_staged<T>(table: &mut Table<T>, held: HashMap<Uuid, Held<T>>) -> Vec<Uuid> {
    let mut touched = Vec::with_capacity(held.len());
    for (id, entry) in held {
        if let (true, Some(row)) = (entry.dirty, entry.row) {
            table.rows.insert(id, row);
        }
        touched.push(id);
    }
    touched
}

impl Drop for MemoryUnitOfWork {
    fn drop(&mut self) {
        self.release();
    }
}

#[async_trait]
impl WalletRepository for MemoryUnitOfWork {
    async fn lock_wallet(
        &mut self,
        account_id: Uuid,
        currency: &Currency,
    ) -> Result<Wallet, StoreError> {
        if !self.wallets.contains_key(&account_id) {
            let held = self.hold(account_id, wallets).await?;
            self.wallets.insert(account_id, held);
        }
        let entry = self
            .wallets
            .get_mut(&account_id)
            .ok_or_else(|| StoreError::Corrupt(format!("wallet {} lock lost", account_id)))?;
        match &entry.row {
            Some(wallet) => Ok(wallet.clone()),
            None => {
                let wallet = Wallet::new(account_id, currency.clone(), chrono::Utc::now());
                entry.row = Some(wallet.clone());
                entry.dirty = true;
                Ok(wallet)
            }
        }
    }

    async fn find_wallet_for_update(
        &mut self,
        account_id: Uuid,
    ) -> Result<Option<Wallet>, StoreError> {
        if !self.wallets.contains_key(&account_id) {
            let held = self.hold(account_id, wallets).await?;
            self.wallets.insert(account_id, held);
        }
        Ok(self.wallets.get(&account_id).and_then(|h| h.row.clone()))
    }

    async fn write_wallet(&mut self, wallet: &Wallet) -> Result<(), StoreError> {
        Self::stage(&mut self.wallets, wallet.account_id, wallet)
    }
}

#[async_trait]
impl TransactionRepository for MemoryUnitOfWork {
    async fn insert_transaction(&mut self, transaction: &Transaction) -> Result<(), StoreError> {
        let tables = lock_tables(&self.tables)?;
        Self::stage_insert(
            &mut self.transactions,
            &tables.transactions.rows,
            transaction.id,
            transaction,
        )
    }

    async fn find_transaction_for_update(
        &mut self,
        id: Uuid,
    ) -> Result<Option<Transaction>, StoreError> {
        if !self.transactions.contains_key(&id) {
            let held = self.hold(id, transactions).await?;
            self.transactions.insert(id, held);
        }
        Ok(self.transactions.get(&id).and_then(|h| h.row.clone()))
    }

    async fn write_transaction_status(
        &mut self,
        transaction: &Transaction,
    ) -> Result<(), StoreError> {
        Self::stage(&mut self.transactions, transaction.id, transaction)
    }
}

#[async_trait]
impl InvoiceRepository for MemoryUnitOfWork {
    async fn next_invoice_sequence(&mut self, year: i32) -> Result<u64, StoreError> {
        let mut tables = lock_tables(&self.tables)?;
        let counter = tables.invoice_sequences.entry(year).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<(), StoreError> {
        let tables = lock_tables(&self.tables)?;
        if tables
            .invoices
            .rows
            .values()
            .any(|existing| existing.invoice_number == invoice.invoice_number)
        {
            return Err(StoreError::Conflict(format!(
                "duplicate invoice number {}",
                invoice.invoice_number
            )));
        }
        Self::stage_insert(&mut self.invoices, &tables.invoices.rows, invoice.id, invoice)
    }

    async fn find_invoice_for_update(&mut self, id: Uuid) -> Result<Option<Invoice>, StoreError> {
        if !self.invoices.contains_key(&id) {
            let held = self.hold(id, invoices).await?;
            self.invoices.insert(id, held);
        }
        Ok(self.invoices.get(&id).and_then(|h| h.row.clone()))
    }

    async fn write_invoice(&mut self, invoice: &Invoice) -> Result<(), StoreError> {
        Self::stage(&mut self.invoices, invoice.id, invoice)
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn commit(mut self) -> Result<(), StoreError> {
        let tables = self.tables.clone();
        let mut guard = lock_tables(&tables)?;
        if let Some(id) = self
            .transactions
            .iter()
            .find(|(id, h)| h._guard.is_none() && guard.transactions.rows.contains_key(*id))
            .map(|(id, _)| *id)
        {
            return Err(StoreError::Conflict(format!("duplicate transaction id {}", id)));
        }
        // Guards are released by `apply_staged`, after the new values are visible
        let wallet_ids = apply_staged(&mut guard.wallets, std::mem::take(&mut self.wallets));
        let transaction_ids =
            apply_staged(&mut guard.transactions, std::mem::take(&mut self.transactions));
        let invoice_ids = apply_staged(&mut guard.invoices, std::mem::take(&mut self.invoices));

        guard.wallets.prune_locks(wallet_ids);
        guard.transactions.prune_locks(transaction_ids);
        guard.invoices.prune_locks(invoice_ids);
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    type Uow = MemoryUnitOfWork;

    async fn begin(&self) -> Result<MemoryUnitOfWork, StoreError> {
        Ok(MemoryUnitOfWork {
            tables: self.tables.clone(),
            lock_timeout: self.lock_timeout,
            wallets: HashMap::new(),
            transactions: HashMap::new(),
            invoices: HashMap::new(),
        })
    }

    async fn get_wallet(&self, account_id: Uuid) -> Result<Option<Wallet>, StoreError> {
        Ok(self.tables()?.wallets.rows.get(&account_id).cloned())
    }

    async fn get_transaction(&self, id: Uuid) -> Result<Option<Transaction>, StoreError> {
        Ok(self.tables()?.transactions.rows.get(&id).cloned())
    }

    async fn query_transactions(
        &self,
        query: &TransactionQuery,
    ) -> Result<Page<Transaction>, StoreError> {
        let mut matching: Vec<Transaction> = self
            .tables()?
            .transactions
            .rows
            .values()
            .filter(|tx| query.matches(tx))
            .cloned()
            .collect();

        let request = &query.page;
        sort_by(&mut matching, request.order, |a, b| match request.sort {
            TransactionSort::CreatedAt => a.created_at.cmp(&b.created_at),
            TransactionSort::Amount => a.amount.cmp(&b.amount),
            TransactionSort::Type => a.transaction_type.as_str().cmp(b.transaction_type.as_str()),
            TransactionSort::Status => a.status.as_str().cmp(b.status.as_str()),
        });
        Ok(Page::from_sorted(matching, request))
    }

    async fn get_invoice(&self, id: Uuid) -> Result<Option<Invoice>, StoreError> {
        Ok(self.tables()?.invoices.rows.get(&id).cloned())
    }

    async fn list_invoices(&self, query: &InvoiceQuery) -> Result<Page<Invoice>, StoreError> {
        let mut matching: Vec<Invoice> = self
            .tables()?
            .invoices
            .rows
            .values()
            .filter(|invoice| query.matches(invoice))
            .cloned()
            .collect();

        let request = &query.page;
        sort_by(&mut matching, request.order, |a, b| match request.sort {
            InvoiceSort::CreatedAt => a.created_at.cmp(&b.created_at),
            InvoiceSort::Amount => a.amount.cmp(&b.amount),
            InvoiceSort::Status => a.status.as_str().cmp(b.status.as_str()),
            InvoiceSort::DueDate => a.due_date.cmp(&b.due_date),
        });
        Ok(Page::from_sorted(matching, request))
    }

    async fn find_due_invoices(
        &self,
        filter: &DueInvoiceFilter,
    ) -> Result<Vec<Invoice>, StoreError> {
        let mut due: Vec<Invoice> = self
            .tables()?
            .invoices
            .rows
            .values()
            .filter(|invoice| filter.matches(invoice))
            .cloned()
            .collect();
        due.sort_by_key(|invoice| invoice.due_date);
        Ok(due)
    }

    async fn invoice_stats(&self, merchant_id: Uuid) -> Result<InvoiceStats, StoreError> {
        let tables = self.tables()?;
        Ok(InvoiceStats::from_invoices(
            tables
                .invoices
                .rows
                .values()
                .filter(|invoice| invoice.merchant_id == merchant_id),
        ))
    }
}

fn sort_by<T>(rows: &mut [T], order: SortOrder, compare: impl Fn(&T, &T) -> std::cmp::Ordering) {
    rows.sort_by(|a, b| match order {
        SortOrder::Asc => compare(a, b),
        SortOrder::Desc => compare(b, a),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Amount, BalanceDelta, LedgerError, NewTransaction, TransactionType};
    use rust_decimal_macros::dec;

    fn etb() -> Currency {
        Currency::new("ETB").unwrap()
    }

    #[tokio::test]
    async fn test_commit_makes_writes_visible() {
        let store = MemoryStore::new();
        let account = Uuid::new_v4();

        let mut uow = store.begin().await.unwrap();
        uow.mutate_balance(account, &etb(), BalanceDelta::Credit(Amount::new(dec!(10)).unwrap()))
            .await
            .unwrap();
        assert!(store.get_wallet(account).await.unwrap().is_none());

        uow.commit().await.unwrap();
        let wallet = store.get_wallet(account).await.unwrap().unwrap();
        assert_eq!(wallet.balance.value(), dec!(10));
    }

    #[tokio::test]
    async fn test_drop_rolls_back() {
        let store = MemoryStore::new();
        let account = Uuid::new_v4();

        {
            let mut uow = store.begin().await.unwrap();
            uow.mutate_balance(account, &etb(), BalanceDelta::Credit(Amount::new(dec!(10)).unwrap()))
                .await
                .unwrap();
            uow.append_transaction(NewTransaction::completed(
                TransactionType::TopUp,
                account,
                None,
                Amount::new(dec!(10)).unwrap(),
                etb(),
            ))
            .await
            .unwrap();
        }

        assert!(store.get_wallet(account).await.unwrap().is_none());
        let history = store
            .query_transactions(&TransactionQuery::for_account(account))
            .await
            .unwrap();
        assert_eq!(history.total, 0);
    }

    #[tokio::test]
    async fn test_row_lock_held_until_commit() {
        let store = MemoryStore::new().with_lock_timeout(Duration::from_millis(50));
        let account = Uuid::new_v4();

        let mut first = store.begin().await.unwrap();
        first.lock_wallet(account, &etb()).await.unwrap();

        let mut second = store.begin().await.unwrap();
        assert!(matches!(
            second.lock_wallet(account, &etb()).await,
            Err(StoreError::LockTimeout)
        ));

        first.commit().await.unwrap();
        assert!(second.lock_wallet(account, &etb()).await.is_ok());
    }

    #[tokio::test]
    async fn test_relocking_in_same_unit_sees_staged_value() {
        let store = MemoryStore::new();
        let account = Uuid::new_v4();
        let mut uow = store.begin().await.unwrap();

        uow.mutate_balance(account, &etb(), BalanceDelta::Credit(Amount::new(dec!(5)).unwrap()))
            .await
            .unwrap();
        let wallet = uow.lock_wallet(account, &etb()).await.unwrap();
        assert_eq!(wallet.balance.value(), dec!(5));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_get_or_create_single_wallet() {
        let store = MemoryStore::new();
        let account = Uuid::new_v4();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let mut uow = store.begin().await.unwrap();
                uow.mutate_balance(
                    account,
                    &Currency::new("ETB").unwrap(),
                    BalanceDelta::Credit(Amount::new(dec!(1)).unwrap()),
                )
                .await
                .unwrap();
                uow.commit().await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let wallet = store.get_wallet(account).await.unwrap().unwrap();
        assert_eq!(wallet.balance.value(), dec!(16));
        assert_eq!(store.tables().unwrap().wallets.rows.len(), 1);
    }

    #[tokio::test]
    async fn test_set_locked_requires_existing_wallet() {
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        assert!(matches!(
            uow.set_wallet_locked(Uuid::new_v4(), true).await,
            Err(LedgerError::WalletNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_ids_leave_no_row_locks() {
        let store = MemoryStore::new();

        for _ in 0..8 {
            let mut uow = store.begin().await.unwrap();
            assert!(uow.set_wallet_locked(Uuid::new_v4(), true).await.is_err());
            assert!(uow.find_invoice_for_update(Uuid::new_v4()).await.unwrap().is_none());
            uow.rollback().await.unwrap();
        }
        {
            let mut uow = store.begin().await.unwrap();
            uow.find_transaction_for_update(Uuid::new_v4()).await.unwrap();
            uow.commit().await.unwrap();
        }

        let tables = store.tables().unwrap();
        assert!(tables.wallets.locks.is_empty());
        assert!(tables.transactions.locks.is_empty());
        assert!(tables.invoices.locks.is_empty());
    }

    #[tokio::test]
    async fn test_row_lock_kept_for_committed_and_waited_rows() {
        let store = MemoryStore::new().with_lock_timeout(Duration::from_millis(200));
        let account = Uuid::new_v4();
        let pending = Uuid::new_v4();

        let mut uow = store.begin().await.unwrap();
        uow.lock_wallet(account, &etb()).await.unwrap();
        uow.commit().await.unwrap();

        // a waiter still needs the lock of a row that was never created
        let mut first = store.begin().await.unwrap();
        first.find_wallet_for_update(pending).await.unwrap();
        let waiter = {
            let store = store.clone();
            tokio::spawn(async move {
                let mut second = store.begin().await.unwrap();
                second.lock_wallet(pending, &etb()).await.unwrap();
                second.commit().await.unwrap();
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(first);
        waiter.await.unwrap();

        let tables = store.tables().unwrap();
        assert!(tables.wallets.locks.contains_key(&account));
        assert!(tables.wallets.locks.contains_key(&pending));
        assert_eq!(tables.wallets.rows.len(), 2);
    }

    #[tokio::test]
    async fn test_invoice_sequence_is_per_year() {
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();

        assert_eq!(uow.generate_invoice_number(2026).await.unwrap(), "INV-2026-00001");
        assert_eq!(uow.generate_invoice_number(2026).await.unwrap(), "INV-2026-00002");
        assert_eq!(uow.generate_invoice_number(2027).await.unwrap(), "INV-2027-00001");
    }
}

//! Ledger reads and transaction status changes

use uuid::Uuid;

use crate::domain::{LedgerError, Page, Transaction, TransactionQuery, TransactionStatusUpdate};
use crate::store::{LedgerStore, TransactionRepository};

use super::{commit_or_rollback, LedgerEngine};

impl<S: LedgerStore> LedgerEngine<S> {
    /// Paginated movements of `query.account_id`
    pub async fn history(&self, query: &TransactionQuery) -> Result<Page<Transaction>, LedgerError> {
        Ok(self.store.query_transactions(query).await?)
    }

    /// A single transaction, visible only to its source or destination
    pub async fn get_transaction(&self, id: Uuid, actor_id: Uuid) -> Result<Transaction, LedgerError> {
        let transaction = self
            .store
            .get_transaction(id)
            .await?
            .ok_or(LedgerError::TransactionNotFound(id))?;

        if !transaction.involves(actor_id) {
            return Err(LedgerError::AccessDenied);
        }
        Ok(transaction)
    }

    /// Move a recorded transaction along its status state machine. Internal to
    /// settlement processing; no balances move here.
    pub async fn update_transaction_status(
        &self,
        id: Uuid,
        update: TransactionStatusUpdate,
    ) -> Result<Transaction, LedgerError> {
        let transaction = self
            .within_deadline("update_transaction_status", async {
                let mut uow = self.store.begin().await?;
                let result = uow.update_transaction_status(id, update).await;
                commit_or_rollback(uow, result).await
            })
            .await?;

        tracing::info!(
            transaction_id = %id,
            status = %transaction.status,
            "Transaction status updated"
        );
        Ok(transaction)
    }
}

//! Transfer and Payment
//!
//! Two-leg movements between accounts. Both legs and the ledger record are
//! written in one unit of work: debit first, then credit, then append.

use crate::domain::{BalanceDelta, LedgerError, NewTransaction, Transaction, TransactionType};
use crate::store::{lock_wallets_in_order, LedgerStore, UnitOfWork};

use super::{commit_or_rollback, LedgerEngine, PaymentCommand, TransferCommand};

impl<S: LedgerStore> LedgerEngine<S> {
    /// Move funds between two distinct accounts
    pub async fn transfer(&self, command: TransferCommand) -> Result<Transaction, LedgerError> {
        let amount = Self::parse_amount(&command.amount)?;
        let currency = self.resolve_currency(command.currency.as_deref())?;
        if command.from_account_id == command.to_account_id {
            return Err(LedgerError::SelfTransfer);
        }

        let movement = NewTransaction::completed(
            TransactionType::Transfer,
            command.from_account_id,
            Some(command.to_account_id),
            amount,
            currency,
        )
        .with_description(command.description);

        let transaction = self.run_movement("transfer", movement).await?;
        tracing::info!(
            transaction_id = %transaction.id,
            from = %transaction.from_account_id,
            to = ?transaction.to_account_id,
            amount = %transaction.amount,
            currency = %transaction.currency,
            "Transfer completed"
        );
        Ok(transaction)
    }

    /// Pay a merchant
    pub async fn payment(&self, command: PaymentCommand) -> Result<Transaction, LedgerError> {
        let amount = Self::parse_amount(&command.amount)?;
        let currency = self.resolve_currency(command.currency.as_deref())?;
        if command.payer_id == command.merchant_id {
            return Err(LedgerError::SelfTransfer);
        }

        let mut movement = NewTransaction::completed(
            TransactionType::Payment,
            command.payer_id,
            Some(command.merchant_id),
            amount,
            currency,
        )
        .with_description(command.description);
        movement.metadata = command.metadata;

        let transaction = self.run_movement("payment", movement).await?;
        tracing::info!(
            transaction_id = %transaction.id,
            payer = %transaction.from_account_id,
            merchant = ?transaction.to_account_id,
            amount = %transaction.amount,
            currency = %transaction.currency,
            "Payment completed"
        );
        Ok(transaction)
    }

    async fn run_movement(
        &self,
        operation: &'static str,
        movement: NewTransaction,
    ) -> Result<Transaction, LedgerError> {
        self.within_deadline(operation, async {
            let mut uow = self.store.begin().await?;
            let result = move_funds(&mut uow, movement).await;
            commit_or_rollback(uow, result).await
        })
        .await
    }
}

/// Debit the source, credit the destination and record the movement.
///
/// Both wallets are locked up front in ascending account order, so two
/// movements over the same pair can never deadlock.
pub(super) async fn move_funds<U: UnitOfWork>(
    uow: &mut U,
    movement: NewTransaction,
) -> Result<Transaction, LedgerError> {
    let from = movement.from_account_id;
    let to = movement.to_account_id.ok_or_else(|| {
        LedgerError::InvalidRequest("movement needs a destination account".to_string())
    })?;
    if from == to {
        return Err(LedgerError::SelfTransfer);
    }

    lock_wallets_in_order(uow, &[from, to], &movement.currency).await?;

    uow.mutate_balance(from, &movement.currency, BalanceDelta::Debit(movement.amount))
        .await?;
    uow.mutate_balance(to, &movement.currency, BalanceDelta::Credit(movement.amount))
        .await?;

    uow.append_transaction(movement).await
}

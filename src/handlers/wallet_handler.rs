//! Wallet operations
//!
//! Single-leg movements against the outside world, balance reads and the
//! administrative lock flag.

use uuid::Uuid;

use crate::domain::{Amount, BalanceDelta, LedgerError, NewTransaction, TransactionType, Wallet};
use crate::store::{LedgerStore, TransactionRepository, WalletRepository};

use super::{commit_or_rollback, LedgerEngine, WalletMovement, WalletMovementCommand};

impl<S: LedgerStore> LedgerEngine<S> {
    /// Credit an account from an external source
    pub async fn top_up(&self, command: WalletMovementCommand) -> Result<WalletMovement, LedgerError> {
        let movement = self.single_leg(TransactionType::TopUp, command)?;
        let result = self.run_single_leg("top_up", movement, BalanceDelta::Credit).await?;
        tracing::info!(
            account_id = %result.wallet.account_id,
            amount = %result.transaction.amount,
            balance = %result.wallet.balance,
            "Top-up completed"
        );
        Ok(result)
    }

    /// Debit an account to an external destination
    pub async fn withdraw(&self, command: WalletMovementCommand) -> Result<WalletMovement, LedgerError> {
        let movement = self.single_leg(TransactionType::Withdraw, command)?;
        let result = self.run_single_leg("withdraw", movement, BalanceDelta::Debit).await?;
        tracing::info!(
            account_id = %result.wallet.account_id,
            amount = %result.transaction.amount,
            balance = %result.wallet.balance,
            "Withdrawal completed"
        );
        Ok(result)
    }

    /// Read a wallet, creating an empty one in the default currency on first
    /// access
    pub async fn get_wallet(&self, account_id: Uuid) -> Result<Wallet, LedgerError> {
        if let Some(wallet) = self.store.get_wallet(account_id).await? {
            return Ok(wallet);
        }

        let currency = self.settings.default_currency.clone();
        self.within_deadline("get_wallet", async {
            let mut uow = self.store.begin().await?;
            let result = uow
                .lock_wallet(account_id, &currency)
                .await
                .map_err(LedgerError::from);
            commit_or_rollback(uow, result).await
        })
        .await
    }

    /// Reject every later balance mutation on this wallet
    pub async fn lock_wallet(&self, account_id: Uuid) -> Result<Wallet, LedgerError> {
        let wallet = self.set_locked("lock_wallet", account_id, true).await?;
        tracing::info!(%account_id, "Wallet locked");
        Ok(wallet)
    }

    pub async fn unlock_wallet(&self, account_id: Uuid) -> Result<Wallet, LedgerError> {
        let wallet = self.set_locked("unlock_wallet", account_id, false).await?;
        tracing::info!(%account_id, "Wallet unlocked");
        Ok(wallet)
    }

    fn single_leg(
        &self,
        transaction_type: TransactionType,
        command: WalletMovementCommand,
    ) -> Result<NewTransaction, LedgerError> {
        let amount = Self::parse_amount(&command.amount)?;
        let currency = self.resolve_currency(command.currency.as_deref())?;
        Ok(
            NewTransaction::completed(transaction_type, command.account_id, None, amount, currency)
                .with_description(command.description),
        )
    }

    async fn run_single_leg(
        &self,
        operation: &'static str,
        movement: NewTransaction,
        leg: fn(Amount) -> BalanceDelta,
    ) -> Result<WalletMovement, LedgerError> {
        self.within_deadline(operation, async {
            let mut uow = self.store.begin().await?;
            let result = async {
                let wallet = uow
                    .mutate_balance(movement.from_account_id, &movement.currency, leg(movement.amount))
                    .await?;
                let transaction = uow.append_transaction(movement).await?;
                Ok::<_, LedgerError>(WalletMovement {
                    wallet,
                    transaction,
                })
            }
            .await;
            commit_or_rollback(uow, result).await
        })
        .await
    }

    async fn set_locked(
        &self,
        operation: &'static str,
        account_id: Uuid,
        locked: bool,
    ) -> Result<Wallet, LedgerError> {
        self.within_deadline(operation, async {
            let mut uow = self.store.begin().await?;
            let result = uow.set_wallet_locked(account_id, locked).await;
            commit_or_rollback(uow, result).await
        })
        .await
    }
}

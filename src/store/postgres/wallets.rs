//! Wallet rows

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use super::PgUnitOfWork;
use crate::domain::{Balance, Currency, Wallet};
use crate::store::{StoreError, WalletRepository};

#[derive(Debug, sqlx::FromRow)]
struct WalletRow {
    account_id: Uuid,
    balance: Decimal,
    currency: String,
    locked: bool,
    created_at: DateTime<Utc>,
    last_updated: DateTime<Utc>,
}

impl TryFrom<WalletRow> for Wallet {
    type Error = StoreError;

    fn try_from(row: WalletRow) -> Result<Self, Self::Error> {
        let corrupt = |what: String| StoreError::Corrupt(format!("wallet {}: {}", row.account_id, what));
        Ok(Wallet {
            account_id: row.account_id,
            balance: Balance::new(row.balance).map_err(|e| corrupt(e.to_string()))?,
            currency: Currency::new(&row.currency).map_err(|e| corrupt(e.to_string()))?,
            locked: row.locked,
            created_at: row.created_at,
            last_updated: row.last_updated,
        })
    }
}

pub(super) async fn get_wallet(pool: &PgPool, account_id: Uuid) -> Result<Option<Wallet>, StoreError> {
    let row: Option<WalletRow> = sqlx::query_as(
        r#"
        SELECT account_id, balance, currency, locked, created_at, last_updated
        FROM wallets
        WHERE account_id = $1
        "#,
    )
    .bind(account_id)
    .fetch_optional(pool)
    .await?;

    row.map(Wallet::try_from).transpose()
}

#[async_trait]
impl WalletRepository for PgUnitOfWork {
    async fn lock_wallet(
        &mut self,
        account_id: Uuid,
        currency: &Currency,
    ) -> Result<Wallet, StoreError> {
        // Insert-if-absent keeps concurrent first access to one row
        sqlx::query(
            r#"
            INSERT INTO wallets (account_id, balance, currency)
            VALUES ($1, 0, $2)
            ON CONFLICT (account_id) DO NOTHING
            "#,
        )
        .bind(account_id)
        .bind(currency.as_str())
        .execute(&mut *self.tx)
        .await?;

        self.find_wallet_for_update(account_id)
            .await?
            .ok_or_else(|| StoreError::Corrupt(format!("wallet {} vanished after insert", account_id)))
    }

    async fn find_wallet_for_update(
        &mut self,
        account_id: Uuid,
    ) -> Result<Option<Wallet>, StoreError> {
        let row: Option<WalletRow> = sqlx::query_as(
            r#"
            SELECT account_id, balance, currency, locked, created_at, last_updated
            FROM wallets
            WHERE account_id = $1
            FOR UPDATE
            "#,
        )
        .bind(account_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(Wallet::try_from).transpose()
    }

    async fn write_wallet(&mut self, wallet: &Wallet) -> Result<(), StoreError> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE wallets
            SET balance = $2, locked = $3, last_updated = $4
            WHERE account_id = $1
            "#,
        )
        .bind(wallet.account_id)
        .bind(wallet.balance.value())
        .bind(wallet.locked)
        .bind(wallet.last_updated)
        .execute(&mut *self.tx)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            return Err(StoreError::Corrupt(format!(
                "wallet {} not found on write",
                wallet.account_id
            )));
        }
        Ok(())
    }
}

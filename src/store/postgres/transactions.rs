//! Transaction rows

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{to_count, PgUnitOfWork};
use crate::domain::{Amount, Currency, Page, SortKey, Transaction, TransactionQuery};
use crate::store::{StoreError, TransactionRepository};

const SELECT_TRANSACTION: &str = r#"
    SELECT id, from_account_id, to_account_id, amount, currency, transaction_type,
           status, description, metadata, fee, created_at, updated_at
    FROM transactions
"#;

#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    from_account_id: Uuid,
    to_account_id: Option<Uuid>,
    amount: Decimal,
    currency: String,
    transaction_type: String,
    status: String,
    description: Option<String>,
    metadata: Option<serde_json::Value>,
    fee: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = StoreError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let corrupt = move |what: String| StoreError::Corrupt(format!("transaction {}: {}", id, what));
        Ok(Transaction {
            id: row.id,
            from_account_id: row.from_account_id,
            to_account_id: row.to_account_id,
            amount: Amount::new(row.amount).map_err(|e| corrupt(e.to_string()))?,
            currency: Currency::new(&row.currency).map_err(|e| corrupt(e.to_string()))?,
            transaction_type: row
                .transaction_type
                .parse()
                .map_err(|e: crate::domain::LedgerError| corrupt(e.to_string()))?,
            status: row
                .status
                .parse()
                .map_err(|e: crate::domain::LedgerError| corrupt(e.to_string()))?,
            description: row.description,
            metadata: row.metadata,
            fee: row.fee,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub(super) async fn get_transaction(
    pool: &PgPool,
    id: Uuid,
) -> Result<Option<Transaction>, StoreError> {
    let sql = format!("{} WHERE id = $1", SELECT_TRANSACTION);
    let row: Option<TransactionRow> = sqlx::query_as(&sql).bind(id).fetch_optional(pool).await?;
    row.map(Transaction::try_from).transpose()
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &TransactionQuery) {
    builder
        .push(" WHERE (from_account_id = ")
        .push_bind(query.account_id)
        .push(" OR to_account_id = ")
        .push_bind(query.account_id)
        .push(")");
    if let Some(transaction_type) = query.transaction_type {
        builder
            .push(" AND transaction_type = ")
            .push_bind(transaction_type.as_str());
    }
    if let Some(status) = query.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
}

/// Paginated history. The ORDER BY column comes from the sort whitelist.
pub(super) async fn query_transactions(
    pool: &PgPool,
    query: &TransactionQuery,
) -> Result<Page<Transaction>, StoreError> {
    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM transactions");
    push_filters(&mut count, query);
    let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

    let request = &query.page;
    let mut select = QueryBuilder::<Postgres>::new(SELECT_TRANSACTION);
    push_filters(&mut select, query);
    select
        .push(format!(
            " ORDER BY {} {}, id {}",
            request.sort.column(),
            request.order.as_sql(),
            request.order.as_sql()
        ))
        .push(" LIMIT ")
        .push_bind(i64::from(request.limit))
        .push(" OFFSET ")
        .push_bind(request.offset() as i64);

    let rows: Vec<TransactionRow> = select.build_query_as().fetch_all(pool).await?;
    let records = rows
        .into_iter()
        .map(Transaction::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Page {
        records,
        total: to_count(total)?,
        page: request.page,
        limit: request.limit,
    })
}

#[async_trait]
impl TransactionRepository for PgUnitOfWork {
    async fn insert_transaction(&mut self, transaction: &Transaction) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO transactions (
                id, from_account_id, to_account_id, amount, currency, transaction_type,
                status, description, metadata, fee, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(transaction.id)
        .bind(transaction.from_account_id)
        .bind(transaction.to_account_id)
        .bind(transaction.amount.value())
        .bind(transaction.currency.as_str())
        .bind(transaction.transaction_type.as_str())
        .bind(transaction.status.as_str())
        .bind(&transaction.description)
        .bind(&transaction.metadata)
        .bind(transaction.fee)
        .bind(transaction.created_at)
        .bind(transaction.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn find_transaction_for_update(
        &mut self,
        id: Uuid,
    ) -> Result<Option<Transaction>, StoreError> {
        let sql = format!("{} WHERE id = $1 FOR UPDATE", SELECT_TRANSACTION);
        let row: Option<TransactionRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(Transaction::try_from).transpose()
    }

    async fn write_transaction_status(
        &mut self,
        transaction: &Transaction,
    ) -> Result<(), StoreError> {
        // Status is the only column a recorded transaction may change
        sqlx::query(
            r#"
            UPDATE transactions
            SET status = $2, updated_at = $3
            WHERE id = $1
            "#,
        )
        .bind(transaction.id)
        .bind(transaction.status.as_str())
        .bind(transaction.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }
}

//! Invoice rows and the per-year invoice sequence

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{to_count, PgUnitOfWork};
use crate::domain::{
    Amount, Currency, Invoice, InvoiceQuery, InvoiceStats, InvoiceView, LedgerError, Page,
    SortKey,
};
use crate::store::{DueInvoiceFilter, InvoiceRepository, StoreError};

const SELECT_INVOICE: &str = r#"
    SELECT id, invoice_number, merchant_id, customer_id, amount, currency, status,
           description, due_date, paid_at, transaction_id, created_at, updated_at
    FROM invoices
"#;

#[derive(Debug, sqlx::FromRow)]
struct InvoiceRow {
    id: Uuid,
    invoice_number: String,
    merchant_id: Uuid,
    customer_id: Option<Uuid>,
    amount: Decimal,
    currency: String,
    status: String,
    description: Option<String>,
    due_date: Option<DateTime<Utc>>,
    paid_at: Option<DateTime<Utc>>,
    transaction_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<InvoiceRow> for Invoice {
    type Error = StoreError;

    fn try_from(row: InvoiceRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let corrupt = move |what: String| StoreError::Corrupt(format!("invoice {}: {}", id, what));
        Ok(Invoice {
            id: row.id,
            invoice_number: row.invoice_number,
            merchant_id: row.merchant_id,
            customer_id: row.customer_id,
            amount: Amount::new(row.amount).map_err(|e| corrupt(e.to_string()))?,
            currency: Currency::new(&row.currency).map_err(|e| corrupt(e.to_string()))?,
            status: row
                .status
                .parse()
                .map_err(|e: LedgerError| corrupt(e.to_string()))?,
            description: row.description,
            due_date: row.due_date,
            paid_at: row.paid_at,
            transaction_id: row.transaction_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_invoices(rows: Vec<InvoiceRow>) -> Result<Vec<Invoice>, StoreError> {
    rows.into_iter().map(Invoice::try_from).collect()
}

pub(super) async fn get_invoice(pool: &PgPool, id: Uuid) -> Result<Option<Invoice>, StoreError> {
    let sql = format!("{} WHERE id = $1", SELECT_INVOICE);
    let row: Option<InvoiceRow> = sqlx::query_as(&sql).bind(id).fetch_optional(pool).await?;
    row.map(Invoice::try_from).transpose()
}

fn push_view(builder: &mut QueryBuilder<'_, Postgres>, query: &InvoiceQuery) {
    match query.view {
        InvoiceView::Merchant => builder.push(" WHERE merchant_id = "),
        InvoiceView::Customer => builder.push(" WHERE customer_id = "),
    };
    builder.push_bind(query.account_id);
}

pub(super) async fn list_invoices(
    pool: &PgPool,
    query: &InvoiceQuery,
) -> Result<Page<Invoice>, StoreError> {
    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM invoices");
    push_view(&mut count, query);
    let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

    let request = &query.page;
    let mut select = QueryBuilder::<Postgres>::new(SELECT_INVOICE);
    push_view(&mut select, query);
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

    let rows: Vec<InvoiceRow> = select.build_query_as().fetch_all(pool).await?;

    Ok(Page {
        records: into_invoices(rows)?,
        total: to_count(total)?,
        page: request.page,
        limit: request.limit,
    })
}

pub(super) async fn find_due_invoices(
    pool: &PgPool,
    filter: &DueInvoiceFilter,
) -> Result<Vec<Invoice>, StoreError> {
    let statuses: Vec<String> = filter
        .statuses
        .iter()
        .map(|status| status.as_str().to_string())
        .collect();

    let mut select = QueryBuilder::<Postgres>::new(SELECT_INVOICE);
    select
        .push(" WHERE due_date IS NOT NULL AND status = ANY(")
        .push_bind(statuses)
        .push(")");
    if let Some(due_from) = filter.due_from {
        select.push(" AND due_date >= ").push_bind(due_from);
    }
    if let Some(due_before) = filter.due_before {
        select.push(" AND due_date < ").push_bind(due_before);
    }
    select.push(" ORDER BY due_date ASC");

    let rows: Vec<InvoiceRow> = select.build_query_as().fetch_all(pool).await?;
    into_invoices(rows)
}

pub(super) async fn invoice_stats(
    pool: &PgPool,
    merchant_id: Uuid,
) -> Result<InvoiceStats, StoreError> {
    let (total, paid, pending, total_amount, paid_amount, pending_amount): (
        i64,
        i64,
        i64,
        Decimal,
        Decimal,
        Decimal,
    ) = sqlx::query_as(
        r#"
        SELECT
            COUNT(*),
            COUNT(*) FILTER (WHERE status = 'paid'),
            COUNT(*) FILTER (WHERE status NOT IN ('paid', 'cancelled')),
            COALESCE(SUM(amount), 0),
            COALESCE(SUM(amount) FILTER (WHERE status = 'paid'), 0),
            COALESCE(SUM(amount) FILTER (WHERE status NOT IN ('paid', 'cancelled')), 0)
        FROM invoices
        WHERE merchant_id = $1
        "#,
    )
    .bind(merchant_id)
    .fetch_one(pool)
    .await?;

    Ok(InvoiceStats {
        total_invoices: to_count(total)?,
        paid_invoices: to_count(paid)?,
        pending_invoices: to_count(pending)?,
        total_amount,
        paid_amount,
        pending_amount,
    })
}

#[async_trait]
impl InvoiceRepository for PgUnitOfWork {
    async fn next_invoice_sequence(&mut self, year: i32) -> Result<u64, StoreError> {
        let value: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO invoice_sequences (year, last_value)
            VALUES ($1, 1)
            ON CONFLICT (year) DO UPDATE
            SET last_value = invoice_sequences.last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(year)
        .fetch_one(&mut *self.tx)
        .await?;

        to_count(value)
    }

    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO invoices (
                id, invoice_number, merchant_id, customer_id, amount, currency, status,
                description, due_date, paid_at, transaction_id, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(invoice.id)
        .bind(&invoice.invoice_number)
        .bind(invoice.merchant_id)
        .bind(invoice.customer_id)
        .bind(invoice.amount.value())
        .bind(invoice.currency.as_str())
        .bind(invoice.status.as_str())
        .bind(&invoice.description)
        .bind(invoice.due_date)
        .bind(invoice.paid_at)
        .bind(invoice.transaction_id)
        .bind(invoice.created_at)
        .bind(invoice.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn find_invoice_for_update(&mut self, id: Uuid) -> Result<Option<Invoice>, StoreError> {
        let sql = format!("{} WHERE id = $1 FOR UPDATE", SELECT_INVOICE);
        let row: Option<InvoiceRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(Invoice::try_from).transpose()
    }

    async fn write_invoice(&mut self, invoice: &Invoice) -> Result<(), StoreError> {
        // A paid row is never rewritten, whatever the caller holds
        let rows_affected = sqlx::query(
            r#"
            UPDATE invoices
            SET customer_id = $2, amount = $3, status = $4, description = $5,
                due_date = $6, paid_at = $7, transaction_id = $8, updated_at = $9
            WHERE id = $1 AND status <> 'paid'
            "#,
        )
        .bind(invoice.id)
        .bind(invoice.customer_id)
        .bind(invoice.amount.value())
        .bind(invoice.status.as_str())
        .bind(&invoice.description)
        .bind(invoice.due_date)
        .bind(invoice.paid_at)
        .bind(invoice.transaction_id)
        .bind(invoice.updated_at)
        .execute(&mut *self.tx)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            return Err(StoreError::Conflict(format!(
                "invoice {} is missing or already paid",
                invoice.id
            )));
        }
        Ok(())
    }
}

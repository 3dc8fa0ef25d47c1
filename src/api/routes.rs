//! API Routes
//!
//! HTTP endpoint definitions. Every route acts as the account named by the
//! request's `OperationContext`.

use axum::{
    extract::{Extension, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::{
    Invoice, InvoiceQuery, InvoiceStats, InvoiceStatus, InvoiceView, LedgerError,
    OperationContext, Page, PageRequest, Transaction, TransactionQuery, Wallet,
};
use super::extract::{ApiJson, ApiPath, ApiQuery};
use crate::error::AppResult;
use crate::handlers::{
    CancelInvoiceCommand, CreateInvoiceCommand, LedgerEngine, PaymentCommand,
    SettleInvoiceCommand, Settlement, TransferCommand, UpdateInvoiceCommand, WalletMovement,
    WalletMovementCommand,
};
use crate::store::LedgerStore;

// =========================================================================
// Request types
// =========================================================================

#[derive(Debug, Deserialize)]
pub struct MovementRequest {
    pub amount: String,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub to_account_id: Uuid,
    pub amount: String,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    pub merchant_id: Uuid,
    pub amount: String,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub sort: Option<String>,
    pub order: Option<String>,
    #[serde(rename = "type")]
    pub transaction_type: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct InvoiceListParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub sort: Option<String>,
    pub order: Option<String>,
    pub view: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateInvoiceRequest {
    pub amount: String,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub customer_id: Option<Uuid>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateInvoiceRequest {
    #[serde(default)]
    pub customer_id: Option<Uuid>,
    #[serde(default)]
    pub amount: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
}

fn parse_filter<T: std::str::FromStr<Err = LedgerError>>(
    value: Option<&str>,
) -> Result<Option<T>, LedgerError> {
    value.filter(|v| !v.is_empty()).map(str::parse::<T>).transpose()
}

fn parse_view(view: Option<&str>) -> Result<InvoiceView, LedgerError> {
    match view {
        None | Some("") | Some("merchant") => Ok(InvoiceView::Merchant),
        Some("customer") => Ok(InvoiceView::Customer),
        Some(other) => Err(LedgerError::InvalidRequest(format!(
            "unknown invoice view: {}",
            other
        ))),
    }
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router<S: LedgerStore>() -> Router<LedgerEngine<S>> {
    Router::new()
        // Wallet
        .route("/wallet", get(get_wallet::<S>))
        .route("/wallet/topup", post(top_up::<S>))
        .route("/wallet/withdraw", post(withdraw::<S>))
        .route("/wallet/lock", post(lock_wallet::<S>))
        .route("/wallet/unlock", post(unlock_wallet::<S>))
        // Money movement
        .route("/transfers", post(transfer::<S>))
        .route("/payments", post(payment::<S>))
        // Ledger
        .route("/transactions", get(history::<S>))
        .route("/transactions/:transaction_id", get(get_transaction::<S>))
        // Invoices
        .route("/invoices", post(create_invoice::<S>).get(list_invoices::<S>))
        .route("/invoices/stats", get(invoice_stats::<S>))
        .route(
            "/invoices/:invoice_id",
            get(get_invoice::<S>).patch(update_invoice::<S>),
        )
        .route("/invoices/:invoice_id/send", post(send_invoice::<S>))
        .route("/invoices/:invoice_id/pay", post(settle_invoice::<S>))
        .route("/invoices/:invoice_id/cancel", post(cancel_invoice::<S>))
}

// =========================================================================
// Wallet
// =========================================================================

/// The actor's wallet, created empty on first read
async fn get_wallet<S: LedgerStore>(
    State(engine): State<LedgerEngine<S>>,
    Extension(context): Extension<OperationContext>,
) -> AppResult<Json<Wallet>> {
    Ok(Json(engine.get_wallet(context.actor_id).await?))
}

fn movement_command(account_id: Uuid, request: MovementRequest) -> WalletMovementCommand {
    WalletMovementCommand {
        account_id,
        amount: request.amount,
        currency: request.currency,
        description: request.description,
    }
}

async fn top_up<S: LedgerStore>(
    State(engine): State<LedgerEngine<S>>,
    Extension(context): Extension<OperationContext>,
    ApiJson(request): ApiJson<MovementRequest>,
) -> AppResult<(StatusCode, Json<WalletMovement>)> {
    let movement = engine
        .top_up(movement_command(context.actor_id, request))
        .await?;
    Ok((StatusCode::CREATED, Json(movement)))
}

async fn withdraw<S: LedgerStore>(
    State(engine): State<LedgerEngine<S>>,
    Extension(context): Extension<OperationContext>,
    ApiJson(request): ApiJson<MovementRequest>,
) -> AppResult<(StatusCode, Json<WalletMovement>)> {
    let movement = engine
        .withdraw(movement_command(context.actor_id, request))
        .await?;
    Ok((StatusCode::CREATED, Json(movement)))
}

async fn lock_wallet<S: LedgerStore>(
    State(engine): State<LedgerEngine<S>>,
    Extension(context): Extension<OperationContext>,
) -> AppResult<Json<Wallet>> {
    Ok(Json(engine.lock_wallet(context.actor_id).await?))
}

async fn unlock_wallet<S: LedgerStore>(
    State(engine): State<LedgerEngine<S>>,
    Extension(context): Extension<OperationContext>,
) -> AppResult<Json<Wallet>> {
    Ok(Json(engine.unlock_wallet(context.actor_id).await?))
}

// =========================================================================
// Transfers and payments
// =========================================================================

async fn transfer<S: LedgerStore>(
    State(engine): State<LedgerEngine<S>>,
    Extension(context): Extension<OperationContext>,
    ApiJson(request): ApiJson<TransferRequest>,
) -> AppResult<(StatusCode, Json<Transaction>)> {
    let command = TransferCommand {
        from_account_id: context.actor_id,
        to_account_id: request.to_account_id,
        amount: request.amount,
        currency: request.currency,
        description: request.description,
    };
    let transaction = engine.transfer(command).await?;
    Ok((StatusCode::CREATED, Json(transaction)))
}

async fn payment<S: LedgerStore>(
    State(engine): State<LedgerEngine<S>>,
    Extension(context): Extension<OperationContext>,
    ApiJson(request): ApiJson<PaymentRequest>,
) -> AppResult<(StatusCode, Json<Transaction>)> {
    let command = PaymentCommand {
        payer_id: context.actor_id,
        merchant_id: request.merchant_id,
        amount: request.amount,
        currency: request.currency,
        description: request.description,
        metadata: request.metadata,
    };
    let transaction = engine.payment(command).await?;
    Ok((StatusCode::CREATED, Json(transaction)))
}

// =========================================================================
// Ledger
// =========================================================================

async fn history<S: LedgerStore>(
    State(engine): State<LedgerEngine<S>>,
    Extension(context): Extension<OperationContext>,
    ApiQuery(params): ApiQuery<HistoryParams>,
) -> AppResult<Json<Page<Transaction>>> {
    let query = TransactionQuery {
        account_id: context.actor_id,
        transaction_type: parse_filter(params.transaction_type.as_deref())?,
        status: parse_filter(params.status.as_deref())?,
        page: PageRequest::parse(
            params.page,
            params.limit,
            params.sort.as_deref(),
            params.order.as_deref(),
        )?,
    };
    Ok(Json(engine.history(&query).await?))
}

async fn get_transaction<S: LedgerStore>(
    State(engine): State<LedgerEngine<S>>,
    Extension(context): Extension<OperationContext>,
    ApiPath(transaction_id): ApiPath<Uuid>,
) -> AppResult<Json<Transaction>> {
    Ok(Json(
        engine.get_transaction(transaction_id, context.actor_id).await?,
    ))
}

// =========================================================================
// Invoices
// =========================================================================

async fn create_invoice<S: LedgerStore>(
    State(engine): State<LedgerEngine<S>>,
    Extension(context): Extension<OperationContext>,
    ApiJson(request): ApiJson<CreateInvoiceRequest>,
) -> AppResult<(StatusCode, Json<Invoice>)> {
    let command = CreateInvoiceCommand {
        merchant_id: context.actor_id,
        amount: request.amount,
        currency: request.currency,
        customer_id: request.customer_id,
        description: request.description,
        due_date: request.due_date,
    };
    let invoice = engine.create_invoice(command).await?;
    Ok((StatusCode::CREATED, Json(invoice)))
}

async fn list_invoices<S: LedgerStore>(
    State(engine): State<LedgerEngine<S>>,
    Extension(context): Extension<OperationContext>,
    ApiQuery(params): ApiQuery<InvoiceListParams>,
) -> AppResult<Json<Page<Invoice>>> {
    let query = InvoiceQuery {
        account_id: context.actor_id,
        view: parse_view(params.view.as_deref())?,
        page: PageRequest::parse(
            params.page,
            params.limit,
            params.sort.as_deref(),
            params.order.as_deref(),
        )?,
    };
    Ok(Json(engine.list_invoices(&query).await?))
}

async fn invoice_stats<S: LedgerStore>(
    State(engine): State<LedgerEngine<S>>,
    Extension(context): Extension<OperationContext>,
) -> AppResult<Json<InvoiceStats>> {
    Ok(Json(engine.invoice_stats(context.actor_id).await?))
}

async fn get_invoice<S: LedgerStore>(
    State(engine): State<LedgerEngine<S>>,
    Extension(context): Extension<OperationContext>,
    ApiPath(invoice_id): ApiPath<Uuid>,
) -> AppResult<Json<Invoice>> {
    Ok(Json(engine.get_invoice(invoice_id, context.actor_id).await?))
}

async fn update_invoice<S: LedgerStore>(
    State(engine): State<LedgerEngine<S>>,
    Extension(context): Extension<OperationContext>,
    ApiPath(invoice_id): ApiPath<Uuid>,
    ApiJson(request): ApiJson<UpdateInvoiceRequest>,
) -> AppResult<Json<Invoice>> {
    let command = UpdateInvoiceCommand {
        invoice_id,
        merchant_id: context.actor_id,
        customer_id: request.customer_id,
        amount: request.amount,
        description: request.description,
        due_date: request.due_date,
    };
    Ok(Json(engine.update_invoice(command).await?))
}

/// Issue a draft to its customer. Merchant only.
async fn send_invoice<S: LedgerStore>(
    State(engine): State<LedgerEngine<S>>,
    Extension(context): Extension<OperationContext>,
    ApiPath(invoice_id): ApiPath<Uuid>,
) -> AppResult<Json<Invoice>> {
    let invoice = engine.get_invoice(invoice_id, context.actor_id).await?;
    if invoice.merchant_id != context.actor_id {
        return Err(LedgerError::AccessDenied.into());
    }
    Ok(Json(
        engine
            .transition_invoice(invoice_id, InvoiceStatus::Sent)
            .await?,
    ))
}

async fn settle_invoice<S: LedgerStore>(
    State(engine): State<LedgerEngine<S>>,
    Extension(context): Extension<OperationContext>,
    ApiPath(invoice_id): ApiPath<Uuid>,
) -> AppResult<Json<Settlement>> {
    let command = SettleInvoiceCommand {
        invoice_id,
        payer_id: context.actor_id,
    };
    Ok(Json(engine.settle_invoice(command).await?))
}

async fn cancel_invoice<S: LedgerStore>(
    State(engine): State<LedgerEngine<S>>,
    Extension(context): Extension<OperationContext>,
    ApiPath(invoice_id): ApiPath<Uuid>,
) -> AppResult<Json<Invoice>> {
    let command = CancelInvoiceCommand {
        invoice_id,
        merchant_id: context.actor_id,
    };
    Ok(Json(engine.cancel_invoice(command).await?))
}

//! Postgres store tests. Skipped unless DATABASE_URL is set.

use std::time::Duration;

use rust_decimal_macros::dec;
use uuid::Uuid;

use ledger_engine::domain::{Currency, InvoiceStatus, LedgerError, TransactionQuery};
use ledger_engine::handlers::{
    CreateInvoiceCommand, SettleInvoiceCommand, TransferCommand, WalletMovementCommand,
};
use ledger_engine::store::{LedgerStore, WalletRepository};
use ledger_engine::{LedgerEngine, PgStore, StoreError};

mod common;

async fn pg_engine() -> Option<LedgerEngine<PgStore>> {
    let pool = common::pg_pool().await?;
    Some(LedgerEngine::new(
        PgStore::new(pool).with_lock_timeout(Duration::from_millis(200)),
    ))
}

macro_rules! engine_or_skip {
    () => {
        match pg_engine().await {
            Some(engine) => engine,
            None => {
                eprintln!("DATABASE_URL not set, skipping");
                return;
            }
        }
    };
}

#[tokio::test]
async fn test_pg_transfer_and_history() {
    let engine = engine_or_skip!();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();

    engine
        .top_up(WalletMovementCommand::new(alice, "100.00"))
        .await
        .unwrap();
    let tx = engine
        .transfer(TransferCommand::new(alice, bob, "35.50"))
        .await
        .unwrap();

    assert_eq!(engine.get_wallet(alice).await.unwrap().balance.value(), dec!(64.50));
    assert_eq!(engine.get_wallet(bob).await.unwrap().balance.value(), dec!(35.50));

    let history = engine
        .history(&TransactionQuery::for_account(bob))
        .await
        .unwrap();
    assert_eq!(history.total, 1);
    assert_eq!(history.records[0].id, tx.id);

    let overdraw = engine
        .transfer(TransferCommand::new(bob, alice, "35.51"))
        .await;
    assert!(matches!(overdraw, Err(LedgerError::InsufficientFunds { .. })));
    assert_eq!(engine.get_wallet(bob).await.unwrap().balance.value(), dec!(35.50));
}

#[tokio::test]
async fn test_pg_rollback_leaves_no_wallet() {
    let engine = engine_or_skip!();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();

    engine
        .top_up(WalletMovementCommand::new(alice, "10"))
        .await
        .unwrap();
    let result = engine
        .transfer(TransferCommand::new(alice, bob, "5").with_currency("USD"))
        .await;
    assert!(matches!(result, Err(LedgerError::CurrencyMismatch { .. })));
    assert!(engine.store().get_wallet(bob).await.unwrap().is_none());
}

#[tokio::test]
async fn test_pg_lock_timeout_is_reported() {
    let engine = engine_or_skip!();
    let alice = Uuid::new_v4();
    engine
        .top_up(WalletMovementCommand::new(alice, "10"))
        .await
        .unwrap();

    let mut blocker = engine.store().begin().await.unwrap();
    blocker
        .lock_wallet(alice, &Currency::default())
        .await
        .unwrap();

    let result = engine
        .withdraw(WalletMovementCommand::new(alice, "1"))
        .await;
    assert!(matches!(
        result,
        Err(LedgerError::Store(StoreError::LockTimeout))
    ));
    drop(blocker);
}

#[tokio::test]
async fn test_pg_settle_invoice_once() {
    let engine = engine_or_skip!();
    let payer = Uuid::new_v4();
    let merchant = Uuid::new_v4();
    engine
        .top_up(WalletMovementCommand::new(payer, "500"))
        .await
        .unwrap();

    let invoice = engine
        .create_invoice(CreateInvoiceCommand::new(merchant, "200").with_customer(payer))
        .await
        .unwrap();
    assert_eq!(invoice.status, InvoiceStatus::Draft);

    let mut handles = Vec::new();
    for _ in 0..4 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .settle_invoice(SettleInvoiceCommand {
                    invoice_id: invoice.id,
                    payer_id: payer,
                })
                .await
        }));
    }

    let mut settled = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => settled += 1,
            Err(LedgerError::AlreadyPaid(_)) | Err(LedgerError::Store(StoreError::LockTimeout)) => {}
            Err(other) => panic!("unexpected error {other:?}"),
        }
    }
    assert_eq!(settled, 1);

    let stored = engine.get_invoice(invoice.id, merchant).await.unwrap();
    assert_eq!(stored.status, InvoiceStatus::Paid);
    assert!(stored.transaction_id.is_some());
    assert_eq!(engine.get_wallet(payer).await.unwrap().balance.value(), dec!(300));
}

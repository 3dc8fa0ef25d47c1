//! Ledger Engine Library
//!
//! Wallets, an append-only transaction ledger and invoices, with every money
//! movement applied atomically through a store unit of work.

pub mod api;
pub mod config;
pub mod db;
pub mod domain;
mod error;
pub mod handlers;
pub mod jobs;
pub mod notify;
pub mod store;

pub use config::Config;
pub use error::{AppError, AppResult, ErrorResponse};
pub use domain::{Amount, AmountError, Balance, Currency, LedgerError, OperationContext};
pub use handlers::{EngineSettings, LedgerEngine};
pub use store::{LedgerStore, MemoryStore, PgStore, StoreError};

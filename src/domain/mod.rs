//! Domain module
//!
//! Core ledger types and the business rules every store backend applies.

pub mod amount;
pub mod context;
pub mod currency;
pub mod error;
pub mod events;
pub mod invoice;
pub mod page;
pub mod transaction;
pub mod wallet;

pub use amount::{Amount, AmountError, Balance};
pub use context::OperationContext;
pub use currency::{Currency, CurrencyError, DEFAULT_CURRENCY};
pub use error::LedgerError;
pub use events::LedgerEvent;
pub use invoice::{
    format_invoice_number, Invoice, InvoiceQuery, InvoiceSort, InvoiceStats, InvoiceStatus,
    InvoiceUpdate, InvoiceView, NewInvoice,
};
pub use page::{Page, PageRequest, SortKey, SortOrder, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};
pub use transaction::{
    NewTransaction, Transaction, TransactionQuery, TransactionSort, TransactionStatus,
    TransactionStatusUpdate, TransactionType,
};
pub use wallet::{BalanceDelta, Wallet};

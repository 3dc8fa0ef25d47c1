//! Ledger Events
//!
//! Facts emitted after a unit of work commits. Subscribers (notification
//! senders, reminder mailers) receive them through `notify::EventBus`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Currency, Invoice};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LedgerEvent {
    /// An invoice was paid by a committed payment
    InvoiceSettled {
        invoice_id: Uuid,
        invoice_number: String,
        merchant_id: Uuid,
        payer_id: Uuid,
        transaction_id: Uuid,
        amount: Decimal,
        currency: Currency,
        settled_at: DateTime<Utc>,
    },

    /// A sent invoice is close to its due date
    PaymentReminderEligible {
        invoice_id: Uuid,
        invoice_number: String,
        merchant_id: Uuid,
        customer_id: Uuid,
        amount: Decimal,
        due_date: DateTime<Utc>,
    },
}

impl LedgerEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::InvoiceSettled { .. } => "InvoiceSettled",
            LedgerEvent::PaymentReminderEligible { .. } => "PaymentReminderEligible",
        }
    }

    pub fn invoice_id(&self) -> Uuid {
        match self {
            LedgerEvent::InvoiceSettled { invoice_id, .. }
            | LedgerEvent::PaymentReminderEligible { invoice_id, .. } => *invoice_id,
        }
    }

    /// Build from a paid invoice. `None` if the invoice is not settled.
    pub fn settled(invoice: &Invoice, payer_id: Uuid) -> Option<Self> {
        Some(LedgerEvent::InvoiceSettled {
            invoice_id: invoice.id,
            invoice_number: invoice.invoice_number.clone(),
            merchant_id: invoice.merchant_id,
            payer_id,
            transaction_id: invoice.transaction_id?,
            amount: invoice.amount.value(),
            currency: invoice.currency.clone(),
            settled_at: invoice.paid_at?,
        })
    }

    /// Build a reminder. `None` without a bound customer or due date.
    pub fn reminder(invoice: &Invoice) -> Option<Self> {
        Some(LedgerEvent::PaymentReminderEligible {
            invoice_id: invoice.id,
            invoice_number: invoice.invoice_number.clone(),
            merchant_id: invoice.merchant_id,
            customer_id: invoice.customer_id?,
            amount: invoice.amount.value(),
            due_date: invoice.due_date?,
        })
    }
}

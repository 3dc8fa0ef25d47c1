//! Invoices
//!
//! Merchant-issued payment requests and their status state machine. A paid
//! invoice is frozen: its amount and settling transaction never change again.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::page::{PageRequest, SortKey};
use super::{Amount, Currency, LedgerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
    Overdue,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, InvoiceStatus::Paid | InvoiceStatus::Cancelled)
    }

    /// Allowed edges:
    /// - draft -> sent
    /// - {draft, sent, overdue} -> paid | cancelled
    /// - {draft, sent} -> overdue
    pub fn can_transition_to(&self, next: InvoiceStatus) -> bool {
        use InvoiceStatus::*;
        match (self, next) {
            (Draft, Sent) => true,
            (Draft | Sent | Overdue, Paid | Cancelled) => true,
            (Draft | Sent, Overdue) => true,
            _ => false,
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(InvoiceStatus::Draft),
            "sent" => Ok(InvoiceStatus::Sent),
            "paid" => Ok(InvoiceStatus::Paid),
            "overdue" => Ok(InvoiceStatus::Overdue),
            "cancelled" => Ok(InvoiceStatus::Cancelled),
            other => Err(LedgerError::InvalidRequest(format!(
                "unknown invoice status: {}",
                other
            ))),
        }
    }
}

/// `INV-<year>-<5-digit sequence>`
pub fn format_invoice_number(year: i32, sequence: u64) -> String {
    format!("INV-{}-{:05}", year, sequence)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub invoice_number: String,
    pub merchant_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub amount: Amount,
    pub currency: Currency,
    pub status: InvoiceStatus,
    pub description: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub transaction_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    /// Merchant or bound customer
    pub fn is_visible_to(&self, account_id: Uuid) -> bool {
        self.merchant_id == account_id || self.customer_id == Some(account_id)
    }

    /// Check that `payer` may settle this invoice now
    pub fn ensure_payable_by(&self, payer: Uuid) -> Result<(), LedgerError> {
        match self.status {
            InvoiceStatus::Paid => return Err(LedgerError::AlreadyPaid(self.id)),
            InvoiceStatus::Cancelled => return Err(LedgerError::InvoiceCancelled(self.id)),
            _ => {}
        }
        if let Some(customer_id) = self.customer_id {
            if customer_id != payer {
                return Err(LedgerError::AccessDenied);
            }
        }
        if payer == self.merchant_id {
            return Err(LedgerError::SelfTransfer);
        }
        Ok(())
    }

    /// Settle with `transaction_id`. The paid check and the link are one step.
    pub fn mark_paid(&self, transaction_id: Uuid, now: DateTime<Utc>) -> Result<Invoice, LedgerError> {
        match self.status {
            InvoiceStatus::Paid => return Err(LedgerError::AlreadyPaid(self.id)),
            InvoiceStatus::Cancelled => return Err(LedgerError::InvoiceCancelled(self.id)),
            _ => {}
        }
        Ok(Invoice {
            status: InvoiceStatus::Paid,
            transaction_id: Some(transaction_id),
            paid_at: Some(now),
            updated_at: now,
            ..self.clone()
        })
    }

    /// Cancel on behalf of `merchant`
    pub fn cancel_by(&self, merchant: Uuid, now: DateTime<Utc>) -> Result<Invoice, LedgerError> {
        if self.merchant_id != merchant {
            return Err(LedgerError::AccessDenied);
        }
        if self.status == InvoiceStatus::Paid {
            return Err(LedgerError::CannotCancelPaid(self.id));
        }
        self.transition(InvoiceStatus::Cancelled, now)
    }

    /// Generic status change. Settlement must go through `mark_paid`.
    pub fn transition(&self, next: InvoiceStatus, now: DateTime<Utc>) -> Result<Invoice, LedgerError> {
        if next == InvoiceStatus::Paid || !self.status.can_transition_to(next) {
            return Err(LedgerError::invalid_transition("invoice", self.status, next));
        }
        Ok(Invoice {
            status: next,
            updated_at: now,
            ..self.clone()
        })
    }

    /// Edit the mutable fields of an open invoice
    pub fn apply_update(
        &self,
        merchant: Uuid,
        update: InvoiceUpdate,
        now: DateTime<Utc>,
    ) -> Result<Invoice, LedgerError> {
        if self.merchant_id != merchant {
            return Err(LedgerError::AccessDenied);
        }
        match self.status {
            InvoiceStatus::Paid => return Err(LedgerError::AlreadyPaid(self.id)),
            InvoiceStatus::Cancelled => return Err(LedgerError::InvoiceCancelled(self.id)),
            _ => {}
        }
        if update.customer_id == Some(self.merchant_id) {
            return Err(LedgerError::SelfTransfer);
        }
        let mut updated = self.clone();
        if let Some(amount) = update.amount {
            updated.amount = amount;
        }
        if let Some(customer_id) = update.customer_id {
            updated.customer_id = Some(customer_id);
        }
        if let Some(description) = update.description {
            updated.description = Some(description);
        }
        if let Some(due_date) = update.due_date {
            updated.due_date = Some(due_date);
        }
        updated.updated_at = now;
        Ok(updated)
    }
}

/// Invoice to be created (always starts in draft)
#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub merchant_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub amount: Amount,
    pub currency: Currency,
    pub description: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
}

impl NewInvoice {
    pub fn into_invoice(self, invoice_number: String, now: DateTime<Utc>) -> Invoice {
        Invoice {
            id: Uuid::new_v4(),
            invoice_number,
            merchant_id: self.merchant_id,
            customer_id: self.customer_id,
            amount: self.amount,
            currency: self.currency,
            status: InvoiceStatus::Draft,
            description: self.description,
            due_date: self.due_date,
            paid_at: None,
            transaction_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Fields a merchant may change before settlement.
/// Status, number and settlement linkage are deliberately absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceUpdate {
    pub customer_id: Option<Uuid>,
    pub amount: Option<Amount>,
    pub description: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InvoiceSort {
    #[default]
    CreatedAt,
    Amount,
    Status,
    DueDate,
}

impl SortKey for InvoiceSort {
    fn column(&self) -> &'static str {
        match self {
            InvoiceSort::CreatedAt => "created_at",
            InvoiceSort::Amount => "amount",
            InvoiceSort::Status => "status",
            InvoiceSort::DueDate => "due_date",
        }
    }
}

impl FromStr for InvoiceSort {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created_at" => Ok(InvoiceSort::CreatedAt),
            "amount" => Ok(InvoiceSort::Amount),
            "status" => Ok(InvoiceSort::Status),
            "due_date" => Ok(InvoiceSort::DueDate),
            other => Err(LedgerError::InvalidRequest(format!(
                "cannot sort invoices by {:?}",
                other
            ))),
        }
    }
}

/// Which side of the invoice the listing account is on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceView {
    #[default]
    Merchant,
    Customer,
}

#[derive(Debug, Clone)]
pub struct InvoiceQuery {
    pub account_id: Uuid,
    pub view: InvoiceView,
    pub page: PageRequest<InvoiceSort>,
}

impl InvoiceQuery {
    pub fn matches(&self, invoice: &Invoice) -> bool {
        match self.view {
            InvoiceView::Merchant => invoice.merchant_id == self.account_id,
            InvoiceView::Customer => invoice.customer_id == Some(self.account_id),
        }
    }
}

/// Per-merchant billing totals
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceStats {
    pub total_invoices: u64,
    pub paid_invoices: u64,
    pub pending_invoices: u64,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub pending_amount: Decimal,
}

impl InvoiceStats {
    /// Fold invoices of one merchant. Pending excludes paid and cancelled.
    pub fn from_invoices<'a>(invoices: impl IntoIterator<Item = &'a Invoice>) -> Self {
        invoices.into_iter().fold(Self::default(), |mut stats, invoice| {
            stats.total_invoices += 1;
            stats.total_amount += invoice.amount.value();
            match invoice.status {
                InvoiceStatus::Paid => {
                    stats.paid_invoices += 1;
                    stats.paid_amount += invoice.amount.value();
                }
                InvoiceStatus::Cancelled => {}
                _ => {
                    stats.pending_invoices += 1;
                    stats.pending_amount += invoice.amount.value();
                }
            }
            stats
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn draft(merchant: Uuid) -> Invoice {
        NewInvoice {
            merchant_id: merchant,
            customer_id: None,
            amount: Amount::new(dec!(25)).unwrap(),
            currency: Currency::new("USD").unwrap(),
            description: None,
            due_date: None,
        }
        .into_invoice(format_invoice_number(2026, 1), Utc::now())
    }

    #[test]
    fn test_invoice_number_format() {
        assert_eq!(format_invoice_number(2026, 7), "INV-2026-00007");
        assert_eq!(format_invoice_number(2026, 123456), "INV-2026-123456");
    }

    #[test]
    fn test_status_state_machine() {
        use InvoiceStatus::*;
        assert!(Draft.can_transition_to(Sent));
        assert!(Sent.can_transition_to(Overdue));
        assert!(Overdue.can_transition_to(Cancelled));
        assert!(Overdue.can_transition_to(Paid));

        assert!(!Paid.can_transition_to(Cancelled));
        assert!(!Paid.can_transition_to(Overdue));
        assert!(!Cancelled.can_transition_to(Draft));
        assert!(!Sent.can_transition_to(Draft));
        assert!(!Overdue.can_transition_to(Overdue));
    }

    #[test]
    fn test_mark_paid_once() {
        let invoice = draft(Uuid::new_v4());
        let tx_id = Uuid::new_v4();

        let paid = invoice.mark_paid(tx_id, Utc::now()).unwrap();
        assert_eq!(paid.status, InvoiceStatus::Paid);
        assert_eq!(paid.transaction_id, Some(tx_id));
        assert!(paid.paid_at.is_some());

        assert!(matches!(
            paid.mark_paid(Uuid::new_v4(), Utc::now()),
            Err(LedgerError::AlreadyPaid(_))
        ));
    }

    #[test]
    fn test_cancel_rules() {
        let merchant = Uuid::new_v4();
        let invoice = draft(merchant);

        assert!(matches!(
            invoice.cancel_by(Uuid::new_v4(), Utc::now()),
            Err(LedgerError::AccessDenied)
        ));

        let cancelled = invoice.cancel_by(merchant, Utc::now()).unwrap();
        assert_eq!(cancelled.status, InvoiceStatus::Cancelled);

        let paid = invoice.mark_paid(Uuid::new_v4(), Utc::now()).unwrap();
        assert!(matches!(
            paid.cancel_by(merchant, Utc::now()),
            Err(LedgerError::CannotCancelPaid(_))
        ));
    }

    #[test]
    fn test_transition_cannot_mark_paid() {
        let invoice = draft(Uuid::new_v4());
        assert!(matches!(
            invoice.transition(InvoiceStatus::Paid, Utc::now()),
            Err(LedgerError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_payable_checks() {
        let merchant = Uuid::new_v4();
        let customer = Uuid::new_v4();
        let mut invoice = draft(merchant);
        invoice.customer_id = Some(customer);

        assert!(invoice.ensure_payable_by(customer).is_ok());
        assert!(matches!(
            invoice.ensure_payable_by(Uuid::new_v4()),
            Err(LedgerError::AccessDenied)
        ));

        let cancelled = invoice.cancel_by(merchant, Utc::now()).unwrap();
        assert!(matches!(
            cancelled.ensure_payable_by(customer),
            Err(LedgerError::InvoiceCancelled(_))
        ));
    }

    #[test]
    fn test_update_frozen_after_payment() {
        let merchant = Uuid::new_v4();
        let invoice = draft(merchant);
        let update = InvoiceUpdate {
            amount: Some(Amount::new(dec!(30)).unwrap()),
            ..Default::default()
        };

        let updated = invoice.apply_update(merchant, update.clone(), Utc::now()).unwrap();
        assert_eq!(updated.amount.value(), dec!(30));

        let paid = invoice.mark_paid(Uuid::new_v4(), Utc::now()).unwrap();
        assert!(matches!(
            paid.apply_update(merchant, update, Utc::now()),
            Err(LedgerError::AlreadyPaid(_))
        ));
    }

    #[test]
    fn test_stats() {
        let merchant = Uuid::new_v4();
        let open = draft(merchant);
        let paid = draft(merchant).mark_paid(Uuid::new_v4(), Utc::now()).unwrap();
        let cancelled = draft(merchant).cancel_by(merchant, Utc::now()).unwrap();

        let stats = InvoiceStats::from_invoices([&open, &paid, &cancelled]);
        assert_eq!(stats.total_invoices, 3);
        assert_eq!(stats.paid_invoices, 1);
        assert_eq!(stats.pending_invoices, 1);
        assert_eq!(stats.total_amount, dec!(75));
        assert_eq!(stats.paid_amount, dec!(25));
        assert_eq!(stats.pending_amount, dec!(25));
    }
}

//! Invoice lifecycle
//!
//! Creation, edits, cancellation and settlement. Settlement locks the invoice
//! row before any wallet, then runs the payment legs and links the payment in
//! the same unit of work.

use uuid::Uuid;

use crate::domain::{
    Invoice, InvoiceQuery, InvoiceStats, InvoiceStatus, InvoiceUpdate, LedgerError, LedgerEvent,
    NewInvoice, NewTransaction, Page, TransactionType,
};
use crate::store::{InvoiceRepository, LedgerStore, UnitOfWork};

use super::transfer_handler::move_funds;
use super::{
    commit_or_rollback, CancelInvoiceCommand, CreateInvoiceCommand, LedgerEngine,
    SettleInvoiceCommand, Settlement, UpdateInvoiceCommand,
};

impl<S: LedgerStore> LedgerEngine<S> {
    /// Issue a draft invoice with the next number of the current year
    pub async fn create_invoice(&self, command: CreateInvoiceCommand) -> Result<Invoice, LedgerError> {
        let amount = Self::parse_amount(&command.amount)?;
        let currency = self.resolve_currency(command.currency.as_deref())?;
        if command.customer_id == Some(command.merchant_id) {
            return Err(LedgerError::SelfTransfer);
        }

        let new_invoice = NewInvoice {
            merchant_id: command.merchant_id,
            customer_id: command.customer_id,
            amount,
            currency,
            description: command.description,
            due_date: command.due_date,
        };

        let invoice = self
            .within_deadline("create_invoice", async {
                let mut uow = self.store.begin().await?;
                let result = uow.create_invoice(new_invoice).await;
                commit_or_rollback(uow, result).await
            })
            .await?;

        tracing::info!(
            invoice_id = %invoice.id,
            invoice_number = %invoice.invoice_number,
            merchant_id = %invoice.merchant_id,
            amount = %invoice.amount,
            "Invoice created"
        );
        Ok(invoice)
    }

    /// An invoice, visible to its merchant and bound customer only
    pub async fn get_invoice(&self, id: Uuid, actor_id: Uuid) -> Result<Invoice, LedgerError> {
        let invoice = self
            .store
            .get_invoice(id)
            .await?
            .ok_or(LedgerError::InvoiceNotFound(id))?;

        if !invoice.is_visible_to(actor_id) {
            return Err(LedgerError::AccessDenied);
        }
        Ok(invoice)
    }

    pub async fn list_invoices(&self, query: &InvoiceQuery) -> Result<Page<Invoice>, LedgerError> {
        Ok(self.store.list_invoices(query).await?)
    }

    pub async fn invoice_stats(&self, merchant_id: Uuid) -> Result<InvoiceStats, LedgerError> {
        Ok(self.store.invoice_stats(merchant_id).await?)
    }

    /// Edit an open invoice on behalf of its merchant
    pub async fn update_invoice(&self, command: UpdateInvoiceCommand) -> Result<Invoice, LedgerError> {
        let amount = command
            .amount
            .as_deref()
            .map(Self::parse_amount)
            .transpose()?;
        let update = InvoiceUpdate {
            customer_id: command.customer_id,
            amount,
            description: command.description,
            due_date: command.due_date,
        };
        let (invoice_id, merchant_id) = (command.invoice_id, command.merchant_id);

        let invoice = self
            .within_deadline("update_invoice", async {
                let mut uow = self.store.begin().await?;
                let result = async {
                    let invoice = uow.lock_invoice(invoice_id).await?;
                    let updated = invoice.apply_update(merchant_id, update, chrono::Utc::now())?;
                    uow.write_invoice(&updated).await?;
                    Ok::<_, LedgerError>(updated)
                }
                .await;
                commit_or_rollback(uow, result).await
            })
            .await?;

        tracing::info!(invoice_id = %invoice.id, "Invoice updated");
        Ok(invoice)
    }

    /// Cancel a non-paid invoice. No wallet is touched.
    pub async fn cancel_invoice(&self, command: CancelInvoiceCommand) -> Result<Invoice, LedgerError> {
        let invoice = self
            .within_deadline("cancel_invoice", async {
                let mut uow = self.store.begin().await?;
                let result = async {
                    let invoice = uow.lock_invoice(command.invoice_id).await?;
                    let cancelled = invoice.cancel_by(command.merchant_id, chrono::Utc::now())?;
                    uow.write_invoice(&cancelled).await?;
                    Ok::<_, LedgerError>(cancelled)
                }
                .await;
                commit_or_rollback(uow, result).await
            })
            .await?;

        tracing::info!(
            invoice_id = %invoice.id,
            invoice_number = %invoice.invoice_number,
            "Invoice cancelled"
        );
        Ok(invoice)
    }

    /// Pay an invoice from `payer_id` and mark it paid, atomically
    pub async fn settle_invoice(&self, command: SettleInvoiceCommand) -> Result<Settlement, LedgerError> {
        let settlement = self
            .within_deadline("settle_invoice", async {
                let mut uow = self.store.begin().await?;
                let result = settle(&mut uow, &command).await;
                commit_or_rollback(uow, result).await
            })
            .await?;

        tracing::info!(
            invoice_id = %settlement.invoice.id,
            invoice_number = %settlement.invoice.invoice_number,
            transaction_id = %settlement.transaction.id,
            payer = %command.payer_id,
            amount = %settlement.transaction.amount,
            "Invoice settled"
        );

        if let Some(event) = LedgerEvent::settled(&settlement.invoice, command.payer_id) {
            self.events.publish(event);
        }
        Ok(settlement)
    }

    /// Status change outside settlement and cancellation, used by maintenance
    pub async fn transition_invoice(
        &self,
        id: Uuid,
        status: InvoiceStatus,
    ) -> Result<Invoice, LedgerError> {
        self.within_deadline("transition_invoice", async {
            let mut uow = self.store.begin().await?;
            let result = uow.update_invoice_status(id, status).await;
            commit_or_rollback(uow, result).await
        })
        .await
    }
}

async fn settle<U: UnitOfWork>(
    uow: &mut U,
    command: &SettleInvoiceCommand,
) -> Result<Settlement, LedgerError> {
    let invoice = uow.lock_invoice(command.invoice_id).await?;
    invoice.ensure_payable_by(command.payer_id)?;

    let movement = NewTransaction::completed(
        TransactionType::Payment,
        command.payer_id,
        Some(invoice.merchant_id),
        invoice.amount,
        invoice.currency.clone(),
    )
    .with_description(Some(format!("Payment for invoice {}", invoice.invoice_number)))
    .with_metadata(serde_json::json!({
        "invoice_id": invoice.id,
        "invoice_number": invoice.invoice_number,
    }));

    let transaction = move_funds(uow, movement).await?;
    let invoice = uow.mark_invoice_paid(invoice.id, transaction.id).await?;

    Ok(Settlement {
        transaction,
        invoice,
    })
}

//! Scheduled Jobs
//!
//! Periodic invoice maintenance. Every job goes through the engine, so each
//! status change runs in its own unit of work under the same row locks as
//! user-initiated operations. An invoice settled or cancelled between the
//! scan and its update is skipped.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;
use tokio::time::interval;

use crate::domain::{Invoice, InvoiceStatus, LedgerError, LedgerEvent};
use crate::handlers::LedgerEngine;
use crate::store::{DueInvoiceFilter, LedgerStore};

/// How far ahead of the due date a sent invoice becomes reminder-eligible
pub const REMINDER_WINDOW_DAYS: i64 = 3;

/// Outcome of moving one invoice during a sweep
enum Step {
    Moved,
    Skipped,
}

async fn move_invoice<S: LedgerStore>(
    engine: &LedgerEngine<S>,
    invoice: &Invoice,
    status: InvoiceStatus,
) -> Result<Step, JobError> {
    match engine.transition_invoice(invoice.id, status).await {
        Ok(_) => Ok(Step::Moved),
        Err(e) if e.is_client_error() => {
            tracing::debug!(
                invoice_id = %invoice.id,
                target = %status,
                reason = %e,
                "Invoice changed since scan, skipped"
            );
            Ok(Step::Skipped)
        }
        Err(e) => Err(e.into()),
    }
}

async fn move_all<S: LedgerStore>(
    engine: &LedgerEngine<S>,
    invoices: &[Invoice],
    status: InvoiceStatus,
) -> Result<u64, JobError> {
    let mut moved = 0;
    for invoice in invoices {
        if let Step::Moved = move_invoice(engine, invoice, status).await? {
            moved += 1;
        }
    }
    Ok(moved)
}

/// Send drafts that have a due date attached
pub async fn promote_dated_drafts<S: LedgerStore>(engine: &LedgerEngine<S>) -> Result<u64, JobError> {
    let drafts = engine
        .store()
        .find_due_invoices(&DueInvoiceFilter {
            statuses: vec![InvoiceStatus::Draft],
            due_from: None,
            due_before: None,
        })
        .await
        .map_err(LedgerError::from)?;

    let promoted = move_all(engine, &drafts, InvoiceStatus::Sent).await?;
    if promoted > 0 {
        tracing::info!(promoted, "Promoted dated draft invoices to sent");
    }
    Ok(promoted)
}

/// Mark open invoices past their due date as overdue
pub async fn mark_overdue_invoices<S: LedgerStore>(
    engine: &LedgerEngine<S>,
    now: DateTime<Utc>,
) -> Result<u64, JobError> {
    let overdue: Vec<Invoice> = engine
        .store()
        .find_overdue_invoices(now)
        .await
        .map_err(LedgerError::from)?
        .into_iter()
        .filter(|invoice| invoice.status != InvoiceStatus::Overdue)
        .collect();

    let marked = move_all(engine, &overdue, InvoiceStatus::Overdue).await?;
    if marked > 0 {
        tracing::info!(marked, "Marked invoices overdue");
    }
    Ok(marked)
}

/// Publish a reminder for every sent invoice due within the reminder window
pub async fn collect_payment_reminders<S: LedgerStore>(
    engine: &LedgerEngine<S>,
    now: DateTime<Utc>,
) -> Result<u64, JobError> {
    let due_soon = engine
        .store()
        .find_due_invoices(&DueInvoiceFilter {
            statuses: vec![InvoiceStatus::Sent],
            due_from: Some(now),
            due_before: Some(now + ChronoDuration::days(REMINDER_WINDOW_DAYS)),
        })
        .await
        .map_err(LedgerError::from)?;

    let mut published = 0;
    for event in due_soon.iter().filter_map(LedgerEvent::reminder) {
        engine.events().publish(event);
        published += 1;
    }
    if published > 0 {
        tracing::info!(published, "Published payment reminders");
    }
    Ok(published)
}

// =========================================================================
// Job Scheduler
// =========================================================================

/// Configuration for job scheduler
#[derive(Debug, Clone)]
pub struct JobSchedulerConfig {
    /// Interval for draft promotion and the overdue sweep (default: 1 hour)
    pub overdue_sweep_interval: Duration,
    /// Interval for payment reminders (default: 1 day)
    pub reminder_interval: Duration,
}

impl Default for JobSchedulerConfig {
    fn default() -> Self {
        Self {
            overdue_sweep_interval: Duration::from_secs(3600),
            reminder_interval: Duration::from_secs(86400),
        }
    }
}

/// Job Scheduler - runs periodic maintenance tasks
pub struct JobScheduler<S> {
    engine: LedgerEngine<S>,
    config: JobSchedulerConfig,
}

impl<S: LedgerStore> JobScheduler<S> {
    pub fn new(engine: LedgerEngine<S>) -> Self {
        Self {
            engine,
            config: JobSchedulerConfig::default(),
        }
    }

    pub fn with_config(engine: LedgerEngine<S>, config: JobSchedulerConfig) -> Self {
        Self { engine, config }
    }

    /// Start the job scheduler in the background
    /// Returns a handle that can be used to abort the scheduler
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Run the scheduler loop
    async fn run(&self) {
        tracing::info!("Job scheduler started");

        let mut sweep_interval = interval(self.config.overdue_sweep_interval);
        let mut reminder_interval = interval(self.config.reminder_interval);

        loop {
            tokio::select! {
                _ = sweep_interval.tick() => {
                    if let Err(e) = promote_dated_drafts(&self.engine).await {
                        tracing::error!(error = %e, "Draft promotion failed");
                    }
                    if let Err(e) = mark_overdue_invoices(&self.engine, Utc::now()).await {
                        tracing::error!(error = %e, "Overdue sweep failed");
                    }
                }
                _ = reminder_interval.tick() => {
                    if let Err(e) = collect_payment_reminders(&self.engine, Utc::now()).await {
                        tracing::error!(error = %e, "Payment reminders failed");
                    }
                }
            }
        }
    }

    /// Run all maintenance jobs once (for manual trigger or testing)
    pub async fn run_all_once(&self, now: DateTime<Utc>) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();

        match promote_dated_drafts(&self.engine).await {
            Ok(count) => report.drafts_promoted = count,
            Err(e) => report.errors.push(format!("Draft promotion: {}", e)),
        }

        match mark_overdue_invoices(&self.engine, now).await {
            Ok(count) => report.invoices_marked_overdue = count,
            Err(e) => report.errors.push(format!("Overdue sweep: {}", e)),
        }

        match collect_payment_reminders(&self.engine, now).await {
            Ok(count) => report.reminders_published = count,
            Err(e) => report.errors.push(format!("Payment reminders: {}", e)),
        }

        report.completed_at = Utc::now();
        report
    }
}

/// Report from running maintenance jobs
#[derive(Debug, Clone, Default)]
pub struct MaintenanceReport {
    pub drafts_promoted: u64,
    pub invoices_marked_overdue: u64,
    pub reminders_published: u64,
    pub errors: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

/// Job execution errors
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{CreateInvoiceCommand, SettleInvoiceCommand, TopUpCommand};
    use crate::store::MemoryStore;
    use uuid::Uuid;

    fn engine() -> LedgerEngine<MemoryStore> {
        LedgerEngine::new(MemoryStore::new())
    }

    async fn invoice_due(
        engine: &LedgerEngine<MemoryStore>,
        customer: Option<Uuid>,
        due: DateTime<Utc>,
    ) -> Invoice {
        let mut command = CreateInvoiceCommand::new(Uuid::new_v4(), "40.00").with_due_date(due);
        command.customer_id = customer;
        engine.create_invoice(command).await.unwrap()
    }

    #[test]
    fn test_job_scheduler_config_default() {
        let config = JobSchedulerConfig::default();
        assert_eq!(config.overdue_sweep_interval, Duration::from_secs(3600));
        assert_eq!(config.reminder_interval, Duration::from_secs(86400));
    }

    #[test]
    fn test_maintenance_report_default() {
        let report = MaintenanceReport::default();
        assert_eq!(report.invoices_marked_overdue, 0);
        assert_eq!(report.errors.len(), 0);
    }

    #[tokio::test]
    async fn test_promote_dated_drafts() {
        let engine = engine();
        let dated = invoice_due(&engine, None, Utc::now() + ChronoDuration::days(10)).await;
        let undated = engine
            .create_invoice(CreateInvoiceCommand::new(Uuid::new_v4(), "5"))
            .await
            .unwrap();

        assert_eq!(promote_dated_drafts(&engine).await.unwrap(), 1);

        let dated = engine.store().get_invoice(dated.id).await.unwrap().unwrap();
        let undated = engine.store().get_invoice(undated.id).await.unwrap().unwrap();
        assert_eq!(dated.status, InvoiceStatus::Sent);
        assert_eq!(undated.status, InvoiceStatus::Draft);
    }

    #[tokio::test]
    async fn test_overdue_sweep_skips_paid_and_cancelled() {
        let engine = engine();
        let now = Utc::now();
        let past = now - ChronoDuration::days(1);

        let open = invoice_due(&engine, None, past).await;
        let cancelled = invoice_due(&engine, None, past).await;
        engine
            .cancel_invoice(crate::handlers::CancelInvoiceCommand {
                invoice_id: cancelled.id,
                merchant_id: cancelled.merchant_id,
            })
            .await
            .unwrap();

        let payer = Uuid::new_v4();
        let paid = invoice_due(&engine, None, past).await;
        engine.top_up(TopUpCommand::new(payer, "100")).await.unwrap();
        engine
            .settle_invoice(SettleInvoiceCommand {
                invoice_id: paid.id,
                payer_id: payer,
            })
            .await
            .unwrap();

        let future = invoice_due(&engine, None, now + ChronoDuration::days(1)).await;

        assert_eq!(mark_overdue_invoices(&engine, now).await.unwrap(), 1);
        // Already overdue invoices are not counted twice
        assert_eq!(mark_overdue_invoices(&engine, now).await.unwrap(), 0);

        let status = |id| {
            let store = engine.store().clone();
            async move { store.get_invoice(id).await.unwrap().unwrap().status }
        };
        assert_eq!(status(open.id).await, InvoiceStatus::Overdue);
        assert_eq!(status(cancelled.id).await, InvoiceStatus::Cancelled);
        assert_eq!(status(paid.id).await, InvoiceStatus::Paid);
        assert_eq!(status(future.id).await, InvoiceStatus::Draft);
    }

    #[tokio::test]
    async fn test_reminders_for_sent_invoices_due_soon() {
        let engine = engine();
        let mut events = engine.events().subscribe();
        let now = Utc::now();
        let customer = Uuid::new_v4();

        let soon = invoice_due(&engine, Some(customer), now + ChronoDuration::days(2)).await;
        invoice_due(&engine, Some(customer), now + ChronoDuration::days(10)).await;
        promote_dated_drafts(&engine).await.unwrap();

        assert_eq!(collect_payment_reminders(&engine, now).await.unwrap(), 1);
        match events.recv().await.unwrap() {
            LedgerEvent::PaymentReminderEligible {
                invoice_id,
                customer_id,
                ..
            } => {
                assert_eq!(invoice_id, soon.id);
                assert_eq!(customer_id, customer);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_run_all_once() {
        let engine = engine();
        let now = Utc::now();
        invoice_due(&engine, None, now - ChronoDuration::hours(1)).await;
        invoice_due(&engine, Some(Uuid::new_v4()), now + ChronoDuration::days(1)).await;

        let report = JobScheduler::new(engine).run_all_once(now).await;
        assert!(report.errors.is_empty());
        assert_eq!(report.drafts_promoted, 2);
        assert_eq!(report.invoices_marked_overdue, 1);
        assert_eq!(report.reminders_published, 1);
    }
}

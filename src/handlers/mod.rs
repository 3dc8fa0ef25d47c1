//! Ledger Engine
//!
//! Orchestrates every money movement and invoice lifecycle change. Each public
//! operation validates its input, then runs inside exactly one unit of work
//! under a deadline; any failure, including the deadline, rolls the whole unit
//! back. Events are published only after commit.

mod commands;
mod invoice_handler;
mod ledger_handler;
mod transfer_handler;
mod wallet_handler;


use std::future::Future;
use std::time::Duration;

use crate::domain::{Amount, Currency, LedgerError};
use crate::notify::EventBus;
use crate::store::{LedgerStore, UnitOfWork};

pub use commands::*;

const DEFAULT_UNIT_OF_WORK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Deadline for one unit of work, lock waits included
    pub unit_of_work_timeout: Duration,
    /// Currency used when a command names none
    pub default_currency: Currency,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            unit_of_work_timeout: DEFAULT_UNIT_OF_WORK_TIMEOUT,
            default_currency: Currency::default(),
        }
    }
}

/// Stateless orchestrator over an injected store
#[derive(Debug, Clone)]
pub struct LedgerEngine<S> {
    store: S,
    events: EventBus,
    settings: EngineSettings,
}

impl<S: LedgerStore> LedgerEngine<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            events: EventBus::default(),
            settings: EngineSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Run `work` under the unit-of-work deadline. A timed-out future is
    /// dropped, which drops its unit of work and releases every row lock.
    async fn within_deadline<T>(
        &self,
        operation: &'static str,
        work: impl Future<Output = Result<T, LedgerError>>,
    ) -> Result<T, LedgerError> {
        let result = match tokio::time::timeout(self.settings.unit_of_work_timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(LedgerError::Timeout),
        };

        if let Err(e) = &result {
            if e.is_client_error() {
                tracing::warn!(operation, code = e.code(), error = %e, "Operation rejected");
            } else {
                tracing::error!(operation, code = e.code(), error = %e, "Operation failed");
            }
        }
        result
    }

    fn parse_amount(amount: &str) -> Result<Amount, LedgerError> {
        Ok(amount.parse::<Amount>()?)
    }

    fn resolve_currency(&self, currency: Option<&str>) -> Result<Currency, LedgerError> {
        match currency {
            Some(code) => Ok(code.parse::<Currency>()?),
            None => Ok(self.settings.default_currency.clone()),
        }
    }
}

/// Commit on success, roll back on failure, and hand back the outcome
async fn commit_or_rollback<U: UnitOfWork, T>(
    uow: U,
    result: Result<T, LedgerError>,
) -> Result<T, LedgerError> {
    match result {
        Ok(value) => {
            uow.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_error) = uow.rollback().await {
                tracing::error!(error = %rollback_error, "Rollback failed");
            }
            Err(e)
        }
    }
}

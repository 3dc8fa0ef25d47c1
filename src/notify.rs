//! Event fan-out
//!
//! Publishes committed `LedgerEvent`s to in-process subscribers. Delivery is
//! best effort: publishing never fails an operation, and a subscriber that
//! falls behind the channel capacity loses the oldest events.

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::domain::LedgerEvent;

const DEFAULT_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<LedgerEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Call only after the unit of work that produced `event` committed
    pub fn publish(&self, event: LedgerEvent) {
        let event_type = event.event_type();
        let invoice_id = event.invoice_id();
        match self.sender.send(event) {
            Ok(receivers) => {
                tracing::debug!(event_type, %invoice_id, receivers, "Event published");
            }
            Err(_) => {
                tracing::debug!(event_type, %invoice_id, "Event published with no subscribers");
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.sender.subscribe()
    }

    /// Subscribe now and log every later event at info on a background task
    pub fn spawn_logger(&self) -> JoinHandle<u64> {
        tokio::spawn(log_events(self.subscribe()))
    }
}

/// Log events until the bus is dropped; returns how many were logged
pub async fn log_events(mut receiver: broadcast::Receiver<LedgerEvent>) -> u64 {
    let mut logged = 0;
    loop {
        match receiver.recv().await {
            Ok(event) => {
                logged += 1;
                match serde_json::to_string(&event) {
                    Ok(payload) => tracing::info!(
                        event_type = event.event_type(),
                        invoice_id = %event.invoice_id(),
                        %payload,
                        "Ledger event"
                    ),
                    Err(e) => tracing::warn!(
                        event_type = event.event_type(),
                        error = %e,
                        "Ledger event could not be serialized"
                    ),
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event logger fell behind");
            }
            Err(RecvError::Closed) => return logged,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{format_invoice_number, Amount, Currency, NewInvoice};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn reminder() -> LedgerEvent {
        let invoice = NewInvoice {
            merchant_id: Uuid::new_v4(),
            customer_id: Some(Uuid::new_v4()),
            amount: Amount::new(dec!(5)).unwrap(),
            currency: Currency::new("ETB").unwrap(),
            description: None,
            due_date: Some(Utc::now()),
        }
        .into_invoice(format_invoice_number(2026, 1), Utc::now());
        LedgerEvent::reminder(&invoice).unwrap()
    }

    #[tokio::test]
    async fn test_subscribers_receive_published_events() {
        let bus = EventBus::default();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        let event = reminder();
        bus.publish(event.clone());

        assert_eq!(first.recv().await.unwrap(), event);
        assert_eq!(second.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_logger_sees_every_event_until_closed() {
        let bus = EventBus::default();
        let logger = bus.spawn_logger();

        bus.publish(reminder());
        bus.publish(reminder());
        drop(bus);

        assert_eq!(logger.await.unwrap(), 2);
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::default();
        bus.publish(reminder());
    }
}

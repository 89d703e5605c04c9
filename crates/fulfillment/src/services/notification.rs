//! Real-time notification sink.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::events::FulfillmentEvent;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notification channel unavailable: {0}")]
    Unavailable(String),
}

/// Publishes facts to connected clients.
///
/// Failures are reported but never undo the change being announced.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, event: &FulfillmentEvent) -> Result<(), NotifyError>;
}

/// Fans events out to every subscriber over a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<FulfillmentEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FulfillmentEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Notifier for BroadcastNotifier {
    async fn publish(&self, event: &FulfillmentEvent) -> Result<(), NotifyError> {
        // No subscribers is not a failure; nobody is listening yet.
        match self.sender.send(event.clone()) {
            Ok(receivers) => tracing::trace!(receivers, event = event.event_type(), "Published"),
            Err(_) => tracing::trace!(event = event.event_type(), "Published with no subscribers"),
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryNotifierState {
    events: Vec<FulfillmentEvent>,
    fail: bool,
}

/// In-memory notifier for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<RwLock<InMemoryNotifierState>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every publish fail until reset.
    pub fn set_fail(&self, fail: bool) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .fail = fail;
    }

    pub fn events(&self) -> Vec<FulfillmentEvent> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .events
            .clone()
    }

    /// Number of published events of the given type.
    pub fn count_of(&self, event_type: &str) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .count()
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn publish(&self, event: &FulfillmentEvent) -> Result<(), NotifyError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.fail {
            return Err(NotifyError::Unavailable("socket hub down".to_string()));
        }
        state.events.push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ReconciliationData;

    fn event() -> FulfillmentEvent {
        FulfillmentEvent::ReconciliationCompleted(ReconciliationData {
            scanned: 3,
            processed: 1,
            skipped: 2,
            errored: 0,
            dry_run: false,
        })
    }

    #[tokio::test]
    async fn broadcast_reaches_subscribers() {
        let notifier = BroadcastNotifier::new(8);
        let mut rx = notifier.subscribe();

        notifier.publish(&event()).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_type(), "ReconciliationCompleted");
    }

    #[tokio::test]
    async fn broadcast_without_subscribers_succeeds() {
        let notifier = BroadcastNotifier::default();
        assert!(notifier.publish(&event()).await.is_ok());
    }

    #[tokio::test]
    async fn in_memory_records_and_fails_on_demand() {
        let notifier = InMemoryNotifier::new();
        notifier.publish(&event()).await.unwrap();

        notifier.set_fail(true);
        assert!(notifier.publish(&event()).await.is_err());

        assert_eq!(notifier.count_of("ReconciliationCompleted"), 1);
    }
}

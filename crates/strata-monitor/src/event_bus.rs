//! In-process event bus over a tokio broadcast channel

use std::sync::Arc;
use strata_domain::traits::EventPublisher;
use strata_domain::DomainEvent;
use tokio::sync::broadcast;
use tracing::debug;

/// Broadcast bus for domain events
///
/// Every subscriber sees every event published after it subscribed. Slow
/// subscribers lose the oldest events once `capacity` is exceeded and are
/// told how many they missed.
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<DomainEvent>>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Subscribe to all events
    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl EventPublisher for EventBus {
    fn publish(&self, event: DomainEvent) {
        let name = event.name();
        let delivered = self.sender.send(event).unwrap_or(0);
        if delivered == 0 {
            debug!("No subscribers listening to {}", name);
        }
    }
}

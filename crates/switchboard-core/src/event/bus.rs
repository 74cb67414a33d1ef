//! Broadcast event bus for `OrchestratorEvent`.
//!
//! Publishing with no active subscribers is a no-op. Deferred tasks complete
//! long after their `submit` call returned, so this is where callers observe
//! replay outcomes.

use switchboard_types::event::OrchestratorEvent;
use tokio::sync::broadcast;

/// Multi-consumer bus. Cloning shares the underlying channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<OrchestratorEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Receive all events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: OrchestratorEvent) {
        let _ = self.sender.send(event);
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("receiver_count", &self.sender.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn deferred() -> OrchestratorEvent {
        OrchestratorEvent::Deferred {
            task_id: Uuid::now_v7(),
            queue_position: 1,
        }
    }

    #[tokio::test]
    async fn subscribers_each_receive_event() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(deferred());

        assert!(matches!(rx1.recv().await.unwrap(), OrchestratorEvent::Deferred { .. }));
        assert!(matches!(rx2.recv().await.unwrap(), OrchestratorEvent::Deferred { .. }));
    }

    #[test]
    fn publish_without_subscribers_is_noop() {
        let bus = EventBus::new(4);
        bus.publish(deferred());
        assert_eq!(bus.receiver_count(), 0);
    }

    #[test]
    fn lagged_receiver_does_not_panic() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for _ in 0..5 {
            bus.publish(deferred());
        }
        match rx.try_recv() {
            Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn clone_shares_channel() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        bus.clone().publish(deferred());
        assert!(rx.try_recv().is_ok());
    }
}

use crate::messages::LoopEvent;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 1024;

/// Fans loop events out to any number of listeners.
///
/// Emitting never blocks or fails: with no listener the event is dropped, and a slow
/// listener loses the oldest events instead of stalling the loop.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<LoopEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LoopEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: LoopEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("No event listeners, event dropped");
        }
    }

    pub fn listeners(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

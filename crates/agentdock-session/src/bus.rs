//! Session-loss bus.
//!
//! The HTTP layer emits here when the backend rejects the session. The
//! runtime subscribes once at startup and turns every signal into a forced
//! disconnect.

use tokio::sync::broadcast;

const CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLoss {
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct SessionLossBus {
    tx: broadcast::Sender<SessionLoss>,
}

impl Default for SessionLossBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLossBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(CAPACITY);
        Self { tx }
    }

    /// Returns the number of subscribers that received the signal.
    pub fn emit(&self, reason: impl Into<String>) -> usize {
        self.tx
            .send(SessionLoss {
                reason: reason.into(),
            })
            .unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionLoss> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscribers_is_dropped() {
        let bus = SessionLossBus::new();
        assert_eq!(bus.emit("401"), 0);
    }

    #[tokio::test]
    async fn test_subscriber_receives_reason() {
        let bus = SessionLossBus::new();
        let mut rx = bus.subscribe();
        assert_eq!(bus.emit("401 unauthorized"), 1);
        assert_eq!(rx.recv().await.unwrap().reason, "401 unauthorized");
    }
}

//! Update Bus
//!
//! One logical clock, bumped after every confirmed write. Read controllers
//! hold a receiver and refresh when it moves.

use tokio::sync::watch;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    Submitted,
    ComparisonTriggered,
    /// Everything was cleared; drop local caches.
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateSignal {
    pub seq: u64,
    /// `None` only for the initial value
    pub kind: Option<UpdateKind>,
    /// Resets published so far. Receivers only see the latest signal, so a
    /// reset followed by another write is detected through this count.
    pub resets: u64,
}

#[derive(Debug, Clone)]
pub struct UpdateBus {
    tx: watch::Sender<UpdateSignal>,
}

impl UpdateBus {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(UpdateSignal {
            seq: 0,
            kind: None,
            resets: 0,
        });
        Self { tx }
    }

    /// Record a confirmed write. Returns the new sequence number.
    pub fn publish(&self, kind: UpdateKind) -> u64 {
        let mut seq = 0;
        self.tx.send_modify(|signal| {
            signal.seq += 1;
            signal.kind = Some(kind);
            if kind == UpdateKind::Reset {
                signal.resets += 1;
            }
            seq = signal.seq;
        });
        debug!(seq, ?kind, "Update published");
        seq
    }

    pub fn subscribe(&self) -> watch::Receiver<UpdateSignal> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> UpdateSignal {
        *self.tx.borrow()
    }
}

impl Default for UpdateBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_is_strictly_increasing() {
        let bus = UpdateBus::new();
        assert_eq!(bus.current().seq, 0);
        assert_eq!(bus.publish(UpdateKind::Submitted), 1);
        assert_eq!(bus.publish(UpdateKind::ComparisonTriggered), 2);
        assert_eq!(bus.publish(UpdateKind::Reset), 3);
        assert_eq!(bus.current().kind, Some(UpdateKind::Reset));
        assert_eq!(bus.current().resets, 1);
    }

    #[tokio::test]
    async fn test_reset_survives_coalescing() {
        let bus = UpdateBus::new();
        let mut rx = bus.subscribe();

        bus.publish(UpdateKind::Reset);
        bus.publish(UpdateKind::Submitted);
        rx.changed().await.unwrap();
        let signal = *rx.borrow_and_update();
        assert_eq!(signal.kind, Some(UpdateKind::Submitted));
        assert_eq!(signal.resets, 1);
    }

    #[tokio::test]
    async fn test_subscriber_sees_latest() {
        let bus = UpdateBus::new();
        let mut rx = bus.subscribe();

        bus.publish(UpdateKind::Submitted);
        rx.changed().await.unwrap();
        let signal = *rx.borrow_and_update();
        assert_eq!(signal.seq, 1);
        assert_eq!(signal.kind, Some(UpdateKind::Submitted));
    }
}

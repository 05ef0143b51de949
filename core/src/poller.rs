//! Background refresh for read controllers.
//!
//! Each poller is a spawned task that re-reads ledger state on a fixed
//! interval and immediately after every [`UpdateBus`](crate::bus::UpdateBus)
//! signal. Polls run one after another, so a poll never overlaps itself.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::bus::UpdateSignal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollTrigger {
    Tick,
    Update(UpdateSignal),
    /// At least one reset was published since the last signal this poller
    /// handled. Carries the latest signal, whose kind may be a later write.
    Reset(UpdateSignal),
}

impl PollTrigger {
    pub fn is_reset(&self) -> bool {
        matches!(self, PollTrigger::Reset(_))
    }
}

/// A controller that can refresh itself from the ledger.
///
/// Implementations swallow transport errors: a failed poll leaves the last
/// known state in place and the next one tries again.
pub trait Poll: Send + Sync + 'static {
    fn poll(&self, trigger: PollTrigger) -> impl Future<Output = ()> + Send;
}

/// Owns a running poller. Dropping it stops the poller.
pub struct PollerHandle {
    name: &'static str,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PollerHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(|t| t.is_finished())
    }

    /// Cancel and wait for the task to exit.
    pub async fn stop(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

pub fn spawn_poller<T: Poll>(
    name: &'static str,
    target: Arc<T>,
    interval: Duration,
    mut updates: watch::Receiver<UpdateSignal>,
) -> PollerHandle {
    let token = CancellationToken::new();
    let cancelled = token.clone();
    let mut resets_seen = updates.borrow().resets;

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut bus_open = true;

        debug!(poller = name, interval_ms = interval.as_millis() as u64, "Poller started");

        loop {
            tokio::select! {
                _ = cancelled.cancelled() => break,
                changed = updates.changed(), if bus_open => {
                    match changed {
                        Ok(()) => {
                            let signal = *updates.borrow_and_update();
                            let trigger = if signal.resets > resets_seen {
                                PollTrigger::Reset(signal)
                            } else {
                                PollTrigger::Update(signal)
                            };
                            resets_seen = signal.resets;
                            target.poll(trigger).await;
                        }
                        // Bus gone; keep polling on the timer.
                        Err(_) => bus_open = false,
                    }
                }
                _ = ticker.tick() => target.poll(PollTrigger::Tick).await,
            }
        }

        debug!(poller = name, "Poller stopped");
    });

    PollerHandle {
        name,
        token,
        task: Some(task),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{UpdateBus, UpdateKind};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        triggers: Mutex<Vec<PollTrigger>>,
    }

    impl Poll for Recorder {
        async fn poll(&self, trigger: PollTrigger) {
            self.triggers.lock().unwrap().push(trigger);
        }
    }

    impl Recorder {
        fn count(&self) -> usize {
            self.triggers.lock().unwrap().len()
        }

        fn updates(&self) -> Vec<UpdateSignal> {
            self.triggers
                .lock()
                .unwrap()
                .iter()
                .filter_map(|t| match t {
                    PollTrigger::Update(s) | PollTrigger::Reset(s) => Some(*s),
                    PollTrigger::Tick => None,
                })
                .collect()
        }
    }

    #[tokio::test]
    async fn test_polls_on_timer() {
        let bus = UpdateBus::new();
        let recorder = Arc::new(Recorder::default());
        let handle = spawn_poller("timer", recorder.clone(), Duration::from_millis(5), bus.subscribe());
        assert_eq!(handle.name(), "timer");

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(recorder.count() >= 3);
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_refreshes_on_update_signal() {
        let bus = UpdateBus::new();
        let recorder = Arc::new(Recorder::default());
        let handle = spawn_poller("bus", recorder.clone(), Duration::from_secs(3600), bus.subscribe());

        bus.publish(UpdateKind::Reset);
        for _ in 0..100 {
            if !recorder.updates().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let updates = recorder.updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].kind, Some(UpdateKind::Reset));
        assert!(recorder.triggers.lock().unwrap().iter().any(|t| t.is_reset()));
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_reset_followed_by_write_is_still_a_reset() {
        let bus = UpdateBus::new();
        let recorder = Arc::new(Recorder::default());
        let handle = spawn_poller("burst", recorder.clone(), Duration::from_secs(3600), bus.subscribe());

        bus.publish(UpdateKind::Reset);
        bus.publish(UpdateKind::Submitted);
        for _ in 0..100 {
            if !recorder.updates().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let triggers = recorder.triggers.lock().unwrap().clone();
        let last = triggers
            .iter()
            .rev()
            .find(|t| !matches!(t, PollTrigger::Tick))
            .copied();
        assert!(matches!(
            last,
            Some(PollTrigger::Reset(UpdateSignal {
                kind: Some(UpdateKind::Submitted),
                ..
            }))
        ));
        handle.stop().await;

        // A later plain write is an ordinary update.
        let recorder = Arc::new(Recorder::default());
        let handle = spawn_poller("after", recorder.clone(), Duration::from_secs(3600), bus.subscribe());
        bus.publish(UpdateKind::Submitted);
        for _ in 0..100 {
            if !recorder.updates().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(matches!(
            recorder.triggers.lock().unwrap().last(),
            Some(PollTrigger::Update(_))
        ));
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_stops_after_shutdown() {
        let bus = UpdateBus::new();
        let recorder = Arc::new(Recorder::default());
        let handle = spawn_poller("stop", recorder.clone(), Duration::from_millis(5), bus.subscribe());

        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.shutdown();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(handle.is_finished());

        let seen = recorder.count();
        bus.publish(UpdateKind::Submitted);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(recorder.count(), seen);
    }
}

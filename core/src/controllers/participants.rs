use std::sync::Arc;

use privwealth_identity::Identity;
use tokio::sync::Mutex;
use tracing::debug;

use crate::inflight::InFlight;
use crate::ledger::Ledger;
use crate::poller::{Poll, PollTrigger};

/// One row of the participants list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantEntry {
    /// 1-based submission order
    pub rank: usize,
    pub identity: Identity,
}

impl ParticipantEntry {
    pub fn label(&self) -> String {
        format!("PARTICIPANT #{}", self.rank)
    }
}

#[derive(Default)]
struct ParticipantsState {
    loaded: bool,
    participants: Vec<Identity>,
}

/// Keeps the ordered participant list fresh.
pub struct ParticipantsController<L> {
    ledger: Arc<L>,
    state: Mutex<ParticipantsState>,
    polling: InFlight,
}

impl<L: Ledger> ParticipantsController<L> {
    pub fn new(ledger: Arc<L>) -> Self {
        Self {
            ledger,
            state: Mutex::new(ParticipantsState::default()),
            polling: InFlight::new(),
        }
    }

    pub async fn refresh(&self) {
        let Some(_guard) = self.polling.try_acquire() else {
            return;
        };
        match self.ledger.get_participants().await {
            Ok(participants) => {
                let mut state = self.state.lock().await;
                state.loaded = true;
                state.participants = participants;
            }
            Err(e) => debug!(error = %e, "Participants poll failed"),
        }
    }

    pub async fn clear(&self) {
        self.state.lock().await.participants.clear();
    }

    /// `false` until the first successful read.
    pub async fn is_loaded(&self) -> bool {
        self.state.lock().await.loaded
    }

    pub async fn participants(&self) -> Vec<Identity> {
        self.state.lock().await.participants.clone()
    }

    pub async fn entries(&self) -> Vec<ParticipantEntry> {
        self.state
            .lock()
            .await
            .participants
            .iter()
            .enumerate()
            .map(|(i, identity)| ParticipantEntry {
                rank: i + 1,
                identity: *identity,
            })
            .collect()
    }

    pub async fn count(&self) -> usize {
        self.state.lock().await.participants.len()
    }

    /// Whether `identity` has submitted, as of the last read.
    pub async fn contains(&self, identity: &Identity) -> bool {
        self.state.lock().await.participants.contains(identity)
    }
}

impl<L: Ledger> Poll for ParticipantsController<L> {
    async fn poll(&self, trigger: PollTrigger) {
        if trigger.is_reset() {
            self.clear().await;
        }
        self.refresh().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{LedgerCall, send_and_confirm};
    use crate::testing::Harness;
    use privwealth_gateway::EncryptionGateway;
    use privwealth_identity::Keypair;

    #[tokio::test]
    async fn test_entries_are_numbered_in_submission_order() {
        let h = Harness::start();
        let c = ParticipantsController::new(h.ledger.clone());
        let a = Keypair::from_seed(&[1u8; 32]);
        let b = Keypair::from_seed(&[2u8; 32]);

        assert!(!c.is_loaded().await);
        for kp in [&a, &b] {
            let handle = h.gateway.encrypt(5, kp.identity(), h.destination).await.unwrap();
            send_and_confirm(h.ledger.as_ref(), LedgerCall::Submit(handle), kp)
                .await
                .unwrap();
        }

        c.refresh().await;
        let entries = c.entries().await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].identity, a.identity());
        assert_eq!(entries[1].label(), "PARTICIPANT #2");
        assert!(c.contains(&b.identity()).await);
    }

    #[tokio::test]
    async fn test_failed_poll_keeps_last_list() {
        let h = Harness::start();
        let c = ParticipantsController::new(h.ledger.clone());
        let a = Keypair::from_seed(&[1u8; 32]);
        let handle = h.gateway.encrypt(5, a.identity(), h.destination).await.unwrap();
        send_and_confirm(h.ledger.as_ref(), LedgerCall::Submit(handle), &a)
            .await
            .unwrap();

        c.refresh().await;
        h.ledger.set_reads_failing(true).await;
        c.poll(PollTrigger::Tick).await;
        assert_eq!(c.participants().await, vec![a.identity()]);
    }
}

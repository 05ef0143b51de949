//! Leaderboard Controller
//!
//! The comparison runs on the network and lands several blocks after the
//! trigger is confirmed. Between the two the board shows `Calculating`; it
//! leaves that state once the ledger reports a comparison settled at or after
//! the trigger's block, or when the configured maximum wait runs out. The
//! settled result may equal the previous one, or be empty.

use std::sync::Arc;
use std::time::{Duration, Instant};

use privwealth_identity::{Identity, Signer};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::bus::{UpdateBus, UpdateKind};
use crate::error::{WealthError, classify};
use crate::inflight::InFlight;
use crate::ledger::{Ledger, LedgerCall, LedgerError, TxReceipt, send_and_confirm};
use crate::poller::{Poll, PollTrigger};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Standings {
    /// No comparison has completed.
    NotYetAvailable,
    /// A comparison was triggered and its result has not been seen yet.
    Calculating,
    Winner(Identity),
    /// Every holder of the maximum, in submission order, with equal rank.
    Tie(Vec<Identity>),
}

impl Standings {
    pub fn winners(&self) -> &[Identity] {
        match self {
            Standings::Winner(id) => std::slice::from_ref(id),
            Standings::Tie(ids) => ids,
            Standings::NotYetAvailable | Standings::Calculating => &[],
        }
    }

    /// Badge shown next to each winning identity.
    pub fn rank_label(&self) -> Option<&'static str> {
        match self {
            Standings::Winner(_) => Some("WINNER"),
            Standings::Tie(_) => Some("SHARED TOP"),
            Standings::NotYetAvailable | Standings::Calculating => None,
        }
    }

    pub fn summary(&self) -> String {
        match self {
            Standings::NotYetAvailable => "No winner yet".into(),
            Standings::Calculating => "Calculating...".into(),
            Standings::Winner(id) => format!("Richest: {}", id.short()),
            Standings::Tie(ids) => format!("{} users share the highest wealth amount", ids.len()),
        }
    }
}

struct Calculating {
    since: Instant,
    /// Block the trigger was included in
    requested_at: u64,
}

#[derive(Default)]
struct BoardState {
    winners: Vec<Identity>,
    calculating: Option<Calculating>,
}

impl BoardState {
    fn expire(&mut self, max_wait: Option<Duration>) {
        let Some(max) = max_wait else {
            return;
        };
        let expired = self
            .calculating
            .as_ref()
            .is_some_and(|calc| calc.since.elapsed() >= max);
        if expired {
            info!(waited_ms = max.as_millis() as u64, "Gave up waiting for comparison result");
            self.calculating = None;
        }
    }

    fn standings(&self) -> Standings {
        if self.calculating.is_some() {
            return Standings::Calculating;
        }
        match self.winners.as_slice() {
            [] => Standings::NotYetAvailable,
            [one] => Standings::Winner(*one),
            many => Standings::Tie(many.to_vec()),
        }
    }
}

pub struct LeaderboardController<L> {
    ledger: Arc<L>,
    bus: UpdateBus,
    max_wait: Option<Duration>,
    state: Mutex<BoardState>,
    triggering: InFlight,
    polling: InFlight,
}

impl<L: Ledger> LeaderboardController<L> {
    pub fn new(ledger: Arc<L>, bus: UpdateBus, max_wait: Option<Duration>) -> Self {
        Self {
            ledger,
            bus,
            max_wait,
            state: Mutex::new(BoardState::default()),
            triggering: InFlight::new(),
            polling: InFlight::new(),
        }
    }

    /// Ask the network to compare all submissions.
    ///
    /// Returns once the request is confirmed; the result arrives later.
    pub async fn trigger_comparison<S: Signer>(&self, signer: &S) -> Result<TxReceipt, WealthError> {
        let _guard = self
            .triggering
            .try_acquire()
            .ok_or(WealthError::Busy("comparison"))?;

        let receipt = send_and_confirm(self.ledger.as_ref(), LedgerCall::TriggerComparison, signer)
            .await
            .map_err(|e| {
                warn!(error = %e, "Comparison trigger failed");
                classify(e)
            })?;

        self.state.lock().await.calculating = Some(Calculating {
            since: Instant::now(),
            requested_at: receipt.block,
        });
        self.bus.publish(UpdateKind::ComparisonTriggered);
        info!(tx = %receipt.hash, block = receipt.block, "Comparison requested");

        Ok(receipt)
    }

    /// Read the current winners. Empty and multi-winner results are both final.
    pub async fn poll_winners(&self) -> Result<Vec<Identity>, WealthError> {
        // Marker first: winners read afterwards are at least as new.
        let resolved_through = self.ledger.get_resolved_through().await.map_err(read_error)?;
        let winners = self.ledger.get_winners().await.map_err(read_error)?;

        let mut state = self.state.lock().await;
        let settled = state
            .calculating
            .as_ref()
            .is_some_and(|calc| resolved_through >= calc.requested_at);
        if settled {
            debug!(winners = winners.len(), resolved_through, "Comparison result observed");
            state.calculating = None;
        }
        state.winners = winners.clone();
        state.expire(self.max_wait);
        Ok(winners)
    }

    pub async fn refresh(&self) {
        let Some(_guard) = self.polling.try_acquire() else {
            return;
        };
        if let Err(e) = self.poll_winners().await {
            debug!(error = %e, "Winners poll failed");
        }
    }

    pub async fn standings(&self) -> Standings {
        let mut state = self.state.lock().await;
        state.expire(self.max_wait);
        state.standings()
    }

    pub async fn is_calculating(&self) -> bool {
        matches!(self.standings().await, Standings::Calculating)
    }

    /// Forget winners and any comparison in progress.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.winners.clear();
        state.calculating = None;
    }
}

fn read_error(e: LedgerError) -> WealthError {
    match e {
        LedgerError::Transport(msg) => WealthError::TransportError(msg),
        other => classify(other),
    }
}

impl<L: Ledger> Poll for LeaderboardController<L> {
    async fn poll(&self, trigger: PollTrigger) {
        if trigger.is_reset() {
            self.clear().await;
        }
        self.refresh().await;
    }
}

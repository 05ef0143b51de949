//! Submission Controller
//!
//! ```text
//!            confirm_amount(raw)                 submit(signer)
//!   Idle ──────────────────▶ Encrypting ──▶ Idle(pending) ──────────▶ Submitting ──▶ Idle
//!    ▲   ValidationError           │              │ set_amount()            │
//!    └── (no external call)        └─ Failure ────┴── pending dropped       └─ error class
//! ```
//!
//! One submission per identity. The participant list is checked before the
//! write and the contract enforces it again on inclusion.

use std::sync::Arc;

use privwealth_gateway::EncryptionGateway;
use privwealth_handle::EncryptedHandle;
use privwealth_identity::{Address, Identity, Signer};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::bus::{UpdateBus, UpdateKind};
use crate::error::{WealthError, classify};
use crate::inflight::InFlight;
use crate::ledger::{Ledger, LedgerCall, TxHash, send_and_confirm};

pub const SUBMIT_SUCCESS_MESSAGE: &str =
    "Wealth submitted successfully! Your encrypted amount has been recorded.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStatus {
    Idle,
    Encrypting,
    Submitting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionReceipt {
    pub tx_hash: TxHash,
    pub block: u64,
}

/// Snapshot for rendering the submission form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionView {
    pub identity: Option<Identity>,
    pub raw_amount: String,
    pub status: SubmissionStatus,
    /// Truncated hex of the handle waiting to be submitted
    pub pending_preview: Option<String>,
    pub last_error: Option<WealthError>,
    pub last_success: Option<SubmissionReceipt>,
}

struct SessionState {
    generation: u64,
    identity: Option<Identity>,
    raw_amount: String,
    status: SubmissionStatus,
    pending: Option<EncryptedHandle>,
    last_error: Option<WealthError>,
    last_success: Option<SubmissionReceipt>,
}

impl SessionState {
    fn new(generation: u64, identity: Option<Identity>) -> Self {
        Self {
            generation,
            identity,
            raw_amount: String::new(),
            status: SubmissionStatus::Idle,
            pending: None,
            last_error: None,
            last_success: None,
        }
    }
}

/// Parse a user-entered amount. Accepts positive decimal integers only.
pub fn parse_amount(raw: &str) -> Result<u128, WealthError> {
    let trimmed = raw.trim();
    match trimmed.parse::<u128>() {
        Ok(amount) if amount > 0 => Ok(amount),
        _ => Err(WealthError::ValidationError(trimmed.to_string())),
    }
}

pub struct SubmissionController<L, G> {
    ledger: Arc<L>,
    gateway: Arc<G>,
    bus: UpdateBus,
    destination: Address,
    state: Mutex<SessionState>,
    encrypting: InFlight,
    submitting: InFlight,
}

impl<L: Ledger, G: EncryptionGateway> SubmissionController<L, G> {
    pub fn new(ledger: Arc<L>, gateway: Arc<G>, bus: UpdateBus, destination: Address) -> Self {
        Self {
            ledger,
            gateway,
            bus,
            destination,
            state: Mutex::new(SessionState::new(0, None)),
            encrypting: InFlight::new(),
            submitting: InFlight::new(),
        }
    }

    /// Switch the connected identity. Discards the session and anything still
    /// in flight for the previous one.
    pub async fn set_identity(&self, identity: Option<Identity>) {
        let mut state = self.state.lock().await;
        let generation = state.generation + 1;
        *state = SessionState::new(generation, identity);
    }

    /// Record an edit to the amount field. Any pending handle is for the old
    /// amount, so it is dropped.
    pub async fn set_amount(&self, raw: &str) {
        let mut state = self.state.lock().await;
        state.raw_amount = raw.to_string();
        state.pending = None;
        state.last_error = None;
    }

    pub async fn view(&self) -> SubmissionView {
        let state = self.state.lock().await;
        SubmissionView {
            identity: state.identity,
            raw_amount: state.raw_amount.clone(),
            status: state.status,
            pending_preview: state.pending.as_ref().map(|h| h.preview()),
            last_error: state.last_error.clone(),
            last_success: state.last_success,
        }
    }

    pub async fn pending_handle(&self) -> Option<EncryptedHandle> {
        self.state.lock().await.pending.clone()
    }

    /// Validate `raw` and encrypt it for the connected identity.
    ///
    /// Invalid input fails before any external call.
    pub async fn confirm_amount(&self, raw: &str) -> Result<EncryptedHandle, WealthError> {
        let amount = match parse_amount(raw) {
            Ok(amount) => amount,
            Err(e) => {
                let mut state = self.state.lock().await;
                state.raw_amount = raw.to_string();
                state.pending = None;
                state.last_error = Some(e.clone());
                return Err(e);
            }
        };

        let _guard = self
            .encrypting
            .try_acquire()
            .ok_or(WealthError::Busy("encryption"))?;

        let (generation, owner) = {
            let mut state = self.state.lock().await;
            let owner = state.identity.ok_or(WealthError::NoIdentity)?;
            state.raw_amount = raw.to_string();
            state.pending = None;
            state.last_error = None;
            state.status = SubmissionStatus::Encrypting;
            (state.generation, owner)
        };

        let result = self.gateway.encrypt(amount, owner, self.destination).await;

        let mut state = self.state.lock().await;
        if state.generation != generation {
            return Err(WealthError::Superseded);
        }
        state.status = SubmissionStatus::Idle;

        match result {
            Ok(handle) => {
                state.pending = Some(handle.clone());
                Ok(handle)
            }
            Err(e) => {
                warn!(owner = %owner.short(), error = %e, "Encryption failed");
                let err = WealthError::from(e);
                state.last_error = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Write the pending handle to the ledger and wait for confirmation.
    pub async fn submit<S: Signer>(&self, signer: &S) -> Result<SubmissionReceipt, WealthError> {
        let _guard = self
            .submitting
            .try_acquire()
            .ok_or(WealthError::Busy("submission"))?;

        let (generation, owner, handle) = {
            let mut state = self.state.lock().await;
            let owner = state.identity.ok_or(WealthError::NoIdentity)?;
            if signer.identity() != owner {
                return Err(WealthError::IdentityMismatch);
            }
            let handle = state.pending.clone().ok_or(WealthError::NoPendingHandle)?;
            state.status = SubmissionStatus::Submitting;
            state.last_error = None;
            (state.generation, owner, handle)
        };

        // Optimistic; the contract re-checks on inclusion.
        match self.ledger.get_participants().await {
            Ok(participants) if participants.contains(&owner) => {
                return self.fail(generation, WealthError::AlreadySubmitted).await;
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Could not read participants before submit"),
        }

        let result = send_and_confirm(self.ledger.as_ref(), LedgerCall::Submit(handle), signer)
            .await
            .map_err(classify);

        let receipt = match result {
            Ok(receipt) => receipt,
            Err(e) => {
                warn!(owner = %owner.short(), error = %e, "Submission failed");
                return self.fail(generation, e).await;
            }
        };

        // Confirmed on the ledger whatever happened to the session meanwhile.
        self.bus.publish(UpdateKind::Submitted);
        info!(owner = %owner.short(), tx = %receipt.hash, block = receipt.block, "Wealth submitted");

        let submitted = SubmissionReceipt {
            tx_hash: receipt.hash,
            block: receipt.block,
        };

        let mut state = self.state.lock().await;
        if state.generation != generation {
            return Err(WealthError::Superseded);
        }
        let identity = state.identity;
        *state = SessionState::new(generation, identity);
        state.last_success = Some(submitted);
        Ok(submitted)
    }

    async fn fail<T>(&self, generation: u64, err: WealthError) -> Result<T, WealthError> {
        let mut state = self.state.lock().await;
        if state.generation != generation {
            return Err(WealthError::Superseded);
        }
        state.status = SubmissionStatus::Idle;
        state.last_error = Some(err.clone());
        Err(err)
    }
}

//! Own-value panel: shows the connected identity's stored handle and reveals
//! it on demand. The plaintext is cached for the session and dropped as soon
//! as the ledger's handle for the owner changes.

use std::sync::Arc;

use privwealth_gateway::EncryptionGateway;
use privwealth_handle::EncryptedHandle;
use privwealth_identity::{Identity, Signer};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::WealthError;
use crate::inflight::InFlight;
use crate::ledger::Ledger;
use crate::poller::{Poll, PollTrigger};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevealView {
    /// The ledger has not been read yet for this identity.
    Loading,
    NoRecord,
    Hidden { handle: EncryptedHandle },
    Revealed { handle: EncryptedHandle, value: u128 },
}

impl RevealView {
    /// What the copy button puts on the clipboard.
    pub fn copy_text(&self) -> Option<String> {
        match self {
            RevealView::Hidden { handle } => Some(handle.to_hex()),
            RevealView::Revealed { value, .. } => Some(value.to_string()),
            RevealView::Loading | RevealView::NoRecord => None,
        }
    }
}

#[derive(Default)]
struct RevealState {
    generation: u64,
    identity: Option<Identity>,
    loaded: bool,
    stored: Option<EncryptedHandle>,
    /// Plaintext of `stored`
    cached: Option<u128>,
    revealed: bool,
}

impl RevealState {
    fn observe(&mut self, handle: Option<EncryptedHandle>) {
        self.loaded = true;
        if self.stored != handle {
            self.stored = handle;
            self.cached = None;
            self.revealed = false;
        }
    }

    fn view(&self) -> RevealView {
        if !self.loaded {
            return RevealView::Loading;
        }
        match (&self.stored, self.cached) {
            (None, _) => RevealView::NoRecord,
            (Some(handle), Some(value)) if self.revealed => RevealView::Revealed {
                handle: handle.clone(),
                value,
            },
            (Some(handle), _) => RevealView::Hidden {
                handle: handle.clone(),
            },
        }
    }
}

pub struct RevealController<L, G> {
    ledger: Arc<L>,
    gateway: Arc<G>,
    state: Mutex<RevealState>,
    revealing: InFlight,
    polling: InFlight,
}

impl<L: Ledger, G: EncryptionGateway> RevealController<L, G> {
    pub fn new(ledger: Arc<L>, gateway: Arc<G>) -> Self {
        Self {
            ledger,
            gateway,
            state: Mutex::new(RevealState::default()),
            revealing: InFlight::new(),
            polling: InFlight::new(),
        }
    }

    pub async fn set_identity(&self, identity: Option<Identity>) {
        let mut state = self.state.lock().await;
        let generation = state.generation + 1;
        *state = RevealState {
            generation,
            identity,
            ..Default::default()
        };
    }

    pub async fn view(&self) -> RevealView {
        self.state.lock().await.view()
    }

    pub async fn copy_text(&self) -> Option<String> {
        self.view().await.copy_text()
    }

    /// Forget the stored handle and any revealed value.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.stored = None;
        state.cached = None;
        state.revealed = false;
    }

    /// Re-read the owner's handle. Skipped if a read is already running;
    /// transport errors leave the current view in place.
    pub async fn refresh(&self) {
        let Some(_guard) = self.polling.try_acquire() else {
            return;
        };
        self.load().await;
    }

    async fn load(&self) {
        let (generation, identity) = {
            let state = self.state.lock().await;
            (state.generation, state.identity)
        };
        let Some(identity) = identity else {
            return;
        };

        match self.ledger.get_own_handle(identity).await {
            Ok(handle) => {
                let mut state = self.state.lock().await;
                if state.generation == generation {
                    state.observe(handle);
                }
            }
            Err(e) => debug!(error = %e, "Own handle poll failed"),
        }
    }

    /// Show or hide the plaintext. The first reveal of a handle asks `signer`
    /// for a fresh authorization; later toggles use the cache.
    pub async fn toggle_reveal<S: Signer>(&self, signer: &S) -> Result<RevealView, WealthError> {
        let have_handle = {
            let state = self.state.lock().await;
            if state.identity.is_none() {
                return Err(WealthError::NoIdentity);
            }
            state.stored.is_some()
        };
        // The record may have landed since the last poll. Read directly: a
        // poller refresh in progress would make `refresh` a no-op.
        if !have_handle {
            self.load().await;
        }

        let (generation, handle) = {
            let mut state = self.state.lock().await;
            let Some(handle) = state.stored.clone() else {
                return Err(WealthError::NoRecord);
            };
            if state.revealed {
                state.revealed = false;
                return Ok(state.view());
            }
            if state.cached.is_some() {
                state.revealed = true;
                return Ok(state.view());
            }
            (state.generation, handle)
        };

        let _guard = self
            .revealing
            .try_acquire()
            .ok_or(WealthError::Busy("reveal"))?;

        let result = self.gateway.reveal(&handle, signer).await;

        let mut state = self.state.lock().await;
        if state.generation != generation || state.stored.as_ref() != Some(&handle) {
            return Err(WealthError::Superseded);
        }
        match result {
            Ok(value) => {
                state.cached = Some(value);
                state.revealed = true;
                Ok(state.view())
            }
            Err(e) => {
                warn!(error = %e, "Reveal failed");
                state.cached = None;
                state.revealed = false;
                Err(e.into())
            }
        }
    }
}

impl<L: Ledger, G: EncryptionGateway> Poll for RevealController<L, G> {
    async fn poll(&self, trigger: PollTrigger) {
        if trigger.is_reset() {
            self.clear().await;
        }
        self.refresh().await;
    }
}

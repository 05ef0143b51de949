//! Composition root: one bus, the five controllers and their pollers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use privwealth_config::PrivWealthConfig;
use privwealth_gateway::EncryptionGateway;
use privwealth_identity::{Address, Identity, Signer};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::bus::UpdateBus;
use crate::controllers::{
    LeaderboardController, ParticipantsController, ResetConfirmation, ResetController,
    RevealController, SubmissionController,
};
use crate::error::WealthError;
use crate::ledger::{Ledger, TxReceipt};
use crate::poller::{PollerHandle, spawn_poller};

#[derive(Debug, Clone)]
pub struct AppSettings {
    pub destination: Address,
    pub participants_interval: Duration,
    pub winners_interval: Duration,
    pub own_handle_interval: Duration,
    pub comparison_max_wait: Option<Duration>,
}

impl AppSettings {
    pub fn from_config(config: &PrivWealthConfig) -> Result<Self> {
        let destination = config
            .ledger
            .destination
            .parse()
            .with_context(|| format!("invalid destination address '{}'", config.ledger.destination))?;

        Ok(Self {
            destination,
            participants_interval: config.polling.participants_interval(),
            winners_interval: config.polling.winners_interval(),
            own_handle_interval: config.polling.own_handle_interval(),
            comparison_max_wait: config.polling.comparison_max_wait(),
        })
    }
}

pub struct WealthApp<L, G> {
    bus: UpdateBus,
    identity: Mutex<Option<Identity>>,
    submission: SubmissionController<L, G>,
    reveal: Arc<RevealController<L, G>>,
    participants: Arc<ParticipantsController<L>>,
    leaderboard: Arc<LeaderboardController<L>>,
    resetter: ResetController<L>,
    pollers: std::sync::Mutex<Vec<PollerHandle>>,
    settings: AppSettings,
}

impl<L: Ledger, G: EncryptionGateway> WealthApp<L, G> {
    pub fn new(ledger: Arc<L>, gateway: Arc<G>, settings: AppSettings) -> Self {
        Self::with_bus(ledger, gateway, settings, UpdateBus::new())
    }

    /// Build on an existing bus, so several instances (one per open view of
    /// the same ledger) see each other's confirmed writes.
    pub fn with_bus(ledger: Arc<L>, gateway: Arc<G>, settings: AppSettings, bus: UpdateBus) -> Self {
        Self {
            submission: SubmissionController::new(
                ledger.clone(),
                gateway.clone(),
                bus.clone(),
                settings.destination,
            ),
            reveal: Arc::new(RevealController::new(ledger.clone(), gateway)),
            participants: Arc::new(ParticipantsController::new(ledger.clone())),
            leaderboard: Arc::new(LeaderboardController::new(
                ledger.clone(),
                bus.clone(),
                settings.comparison_max_wait,
            )),
            resetter: ResetController::new(ledger, bus.clone()),
            bus,
            identity: Mutex::new(None),
            pollers: std::sync::Mutex::new(Vec::new()),
            settings,
        }
    }

    /// Start the background refresh for every read controller.
    pub fn start_polling(&self) {
        let mut pollers = match self.pollers.lock() {
            Ok(pollers) => pollers,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !pollers.is_empty() {
            return;
        }
        pollers.push(spawn_poller(
            "participants",
            self.participants.clone(),
            self.settings.participants_interval,
            self.bus.subscribe(),
        ));
        pollers.push(spawn_poller(
            "winners",
            self.leaderboard.clone(),
            self.settings.winners_interval,
            self.bus.subscribe(),
        ));
        pollers.push(spawn_poller(
            "own_handle",
            self.reveal.clone(),
            self.settings.own_handle_interval,
            self.bus.subscribe(),
        ));
        info!(pollers = pollers.len(), "Polling started");
    }

    /// Connect (or disconnect, with `None`) a wallet. Per-identity state in
    /// every controller is discarded.
    pub async fn connect(&self, identity: Option<Identity>) {
        {
            let mut current = self.identity.lock().await;
            if *current == identity {
                return;
            }
            *current = identity;
        }
        self.submission.set_identity(identity).await;
        self.reveal.set_identity(identity).await;
        self.reveal.refresh().await;

        match identity {
            Some(id) => info!(identity = %id.short(), "Wallet connected"),
            None => info!("Wallet disconnected"),
        }
    }

    pub async fn identity(&self) -> Option<Identity> {
        *self.identity.lock().await
    }

    /// Refresh every read controller now.
    pub async fn refresh_all(&self) {
        self.participants.refresh().await;
        self.leaderboard.refresh().await;
        self.reveal.refresh().await;
    }

    /// Clear everything on the ledger, then drop every local cache.
    pub async fn reset<S: Signer>(
        &self,
        signer: &S,
        confirmation: ResetConfirmation,
    ) -> Result<TxReceipt, WealthError> {
        let receipt = self.resetter.reset(signer, confirmation).await?;
        self.participants.clear().await;
        self.leaderboard.clear().await;
        self.reveal.clear().await;
        self.refresh_all().await;
        Ok(receipt)
    }

    pub fn bus(&self) -> &UpdateBus {
        &self.bus
    }

    pub fn submission(&self) -> &SubmissionController<L, G> {
        &self.submission
    }

    pub fn reveal(&self) -> &RevealController<L, G> {
        &self.reveal
    }

    pub fn participants(&self) -> &ParticipantsController<L> {
        &self.participants
    }

    pub fn leaderboard(&self) -> &LeaderboardController<L> {
        &self.leaderboard
    }

    pub fn pollers_running(&self) -> usize {
        match self.pollers.lock() {
            Ok(pollers) => pollers.iter().filter(|p| !p.is_finished()).count(),
            Err(poisoned) => poisoned.into_inner().iter().filter(|p| !p.is_finished()).count(),
        }
    }

    /// Stop all pollers and wait for them to exit.
    pub async fn shutdown(&self) {
        let pollers = match self.pollers.lock() {
            Ok(mut pollers) => std::mem::take(&mut *pollers),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for poller in pollers {
            let name = poller.name();
            poller.stop().await;
            debug!(poller = name, "Poller joined");
        }
        info!("Shut down");
    }
}

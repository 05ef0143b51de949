//! In-memory Ledger
//!
//! A single-contract chain that produces a block every `block_time`. Writes are
//! queued in a mempool and applied in order when the next block is produced.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                        Block N                                        │
//! │                                                                       │
//! │  mempool ──▶ apply Submit / TriggerComparison / ResetAll ──▶ receipts │
//! │                              │                                        │
//! │                              ▼                                        │
//! │             pending comparison (snapshot, resolve_at = N + delay)     │
//! │                                                                       │
//! │  then: every comparison with resolve_at <= N overwrites the winners   │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use privwealth_config::LedgerConfig;
use privwealth_gateway::LocalConfidentialService;
use privwealth_handle::EncryptedHandle;
use privwealth_identity::{Address, Identity, Signer, SignerError};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{Ledger, LedgerCall, LedgerError, REASON_ALREADY_SUBMITTED, TxHash, TxReceipt, TxStatus};

// Configuration

#[derive(Debug, Clone)]
pub struct LocalLedgerConfig {
    pub chain_id: u64,
    /// Contract address handles must be bound to
    pub destination: Address,
    pub block_time: Duration,
    /// Blocks between a comparison's inclusion and its result
    pub comparison_delay_blocks: u64,
    /// Charged to the sender of every write (0 disables funding checks)
    pub fee_per_write: u64,
    pub receipt_timeout: Duration,
}

impl Default for LocalLedgerConfig {
    fn default() -> Self {
        Self {
            chain_id: 84532,
            destination: Address([0x5f; 20]),
            block_time: Duration::from_millis(500),
            comparison_delay_blocks: 3,
            fee_per_write: 0,
            receipt_timeout: Duration::from_secs(30),
        }
    }
}

impl LocalLedgerConfig {
    pub fn from_config(config: &LedgerConfig) -> Result<Self> {
        let destination: Address = config
            .destination
            .parse()
            .with_context(|| format!("invalid destination address '{}'", config.destination))?;

        Ok(Self {
            chain_id: config.chain_id,
            destination,
            block_time: config.block_time(),
            comparison_delay_blocks: config.comparison_delay_blocks,
            fee_per_write: config.fee_per_write,
            receipt_timeout: config.receipt_timeout(),
        })
    }
}

// Chain State

/// Unclaimed receipts are dropped after this many blocks.
const RECEIPT_RETENTION_BLOCKS: u64 = 1_024;

struct PendingTx {
    hash: TxHash,
    sender: Identity,
    call: LedgerCall,
}

struct PendingComparison {
    requested_at: u64,
    resolve_at: u64,
    snapshot: Vec<(Identity, EncryptedHandle)>,
}

#[derive(Default)]
struct ChainState {
    block: u64,
    /// Contract storage
    records: HashMap<Identity, EncryptedHandle>,
    participants: Vec<Identity>,
    winners: Vec<Identity>,
    comparisons: Vec<PendingComparison>,
    resolved_through: u64,
    // Chain bookkeeping
    mempool: Vec<PendingTx>,
    receipts: HashMap<TxHash, TxReceipt>,
    nonces: HashMap<Identity, u64>,
    balances: HashMap<Identity, u64>,
    reads_failing: bool,
}

impl ChainState {
    fn check_reads(&self) -> Result<(), LedgerError> {
        if self.reads_failing {
            return Err(LedgerError::Transport("connection refused".into()));
        }
        Ok(())
    }

    fn apply(&mut self, tx: &PendingTx, config: &LocalLedgerConfig) -> TxStatus {
        let balance = self.balances.entry(tx.sender).or_default();
        *balance = balance.saturating_sub(config.fee_per_write);

        match &tx.call {
            LedgerCall::Submit(handle) => {
                if self.records.contains_key(&tx.sender) {
                    return TxStatus::Reverted(REASON_ALREADY_SUBMITTED.into());
                }
                self.records.insert(tx.sender, handle.clone());
                self.participants.push(tx.sender);
            }
            LedgerCall::TriggerComparison => {
                let snapshot = self
                    .participants
                    .iter()
                    .filter_map(|id| self.records.get(id).map(|h| (*id, h.clone())))
                    .collect();
                self.comparisons.push(PendingComparison {
                    requested_at: self.block,
                    resolve_at: self.block + config.comparison_delay_blocks,
                    snapshot,
                });
            }
            LedgerCall::ResetAll => {
                self.records.clear();
                self.participants.clear();
                self.winners.clear();
                self.comparisons.clear();
                self.resolved_through = self.block;
            }
        }
        TxStatus::Success
    }

    fn produce_block(&mut self, config: &LocalLedgerConfig, service: &LocalConfidentialService) {
        self.block += 1;
        let block = self.block;

        let txs = std::mem::take(&mut self.mempool);
        for tx in &txs {
            let status = self.apply(tx, config);
            debug!(block, tx = %tx.hash, call = tx.call.name(), ?status, "Included transaction");
            self.receipts.insert(
                tx.hash,
                TxReceipt {
                    hash: tx.hash,
                    block,
                    status,
                },
            );
        }

        self.receipts
            .retain(|_, receipt| receipt.block + RECEIPT_RETENTION_BLOCKS > block);

        let (due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.comparisons)
            .into_iter()
            .partition(|c| c.resolve_at <= block);
        self.comparisons = pending;

        for comparison in due {
            let indices = service.max_indices(&comparison.snapshot, config.destination);
            self.winners = indices
                .into_iter()
                .map(|i| comparison.snapshot[i].0)
                .collect();
            self.resolved_through = self.resolved_through.max(comparison.requested_at);
            info!(
                block,
                participants = comparison.snapshot.len(),
                winners = self.winners.len(),
                "Comparison resolved"
            );
        }
    }
}

// Local Ledger

pub struct LocalLedger {
    config: LocalLedgerConfig,
    state: Arc<Mutex<ChainState>>,
    shutdown: CancellationToken,
}

impl LocalLedger {
    /// Start the ledger and its block producer.
    ///
    /// `service` is the comparison engine; it must share the network key the
    /// clients encrypt to.
    pub fn start(config: LocalLedgerConfig, service: Arc<LocalConfidentialService>) -> Self {
        let state = Arc::new(Mutex::new(ChainState::default()));
        let shutdown = CancellationToken::new();

        info!(
            chain_id = config.chain_id,
            destination = %config.destination,
            block_time_ms = config.block_time.as_millis() as u64,
            comparison_delay_blocks = config.comparison_delay_blocks,
            "Starting local ledger"
        );

        let producer_state = state.clone();
        let producer_config = config.clone();
        let token = shutdown.clone();
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(producer_config.block_time.max(Duration::from_millis(1)));
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        info!("Local ledger stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        producer_state
                            .lock()
                            .await
                            .produce_block(&producer_config, &service);
                    }
                }
            }
        });

        Self {
            config,
            state,
            shutdown,
        }
    }

    pub fn config(&self) -> &LocalLedgerConfig {
        &self.config
    }

    /// Credit `amount` to `identity` for paying write fees.
    pub async fn fund(&self, identity: Identity, amount: u64) {
        *self.state.lock().await.balances.entry(identity).or_default() += amount;
    }

    pub async fn balance(&self, identity: Identity) -> u64 {
        self.state
            .lock()
            .await
            .balances
            .get(&identity)
            .copied()
            .unwrap_or(0)
    }

    /// Make every read fail with a transport error until switched back.
    pub async fn set_reads_failing(&self, failing: bool) {
        self.state.lock().await.reads_failing = failing;
    }

    pub async fn block_number(&self) -> u64 {
        self.state.lock().await.block
    }

    /// Comparisons included but not yet resolved.
    pub async fn pending_comparisons(&self) -> usize {
        self.state.lock().await.comparisons.len()
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    fn signer_error(e: SignerError) -> LedgerError {
        match e {
            SignerError::Rejected => LedgerError::SignerRejected,
            SignerError::Unavailable(msg) => LedgerError::Other(msg),
        }
    }
}

impl Drop for LocalLedger {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl Ledger for LocalLedger {
    async fn get_own_handle(&self, owner: Identity) -> Result<Option<EncryptedHandle>, LedgerError> {
        let state = self.state.lock().await;
        state.check_reads()?;
        Ok(state.records.get(&owner).cloned())
    }

    async fn get_participants(&self) -> Result<Vec<Identity>, LedgerError> {
        let state = self.state.lock().await;
        state.check_reads()?;
        Ok(state.participants.clone())
    }

    async fn get_winners(&self) -> Result<Vec<Identity>, LedgerError> {
        let state = self.state.lock().await;
        state.check_reads()?;
        Ok(state.winners.clone())
    }

    async fn get_resolved_through(&self) -> Result<u64, LedgerError> {
        let state = self.state.lock().await;
        state.check_reads()?;
        Ok(state.resolved_through)
    }

    async fn send<S: Signer>(&self, call: LedgerCall, signer: &S) -> Result<TxHash, LedgerError> {
        if self.shutdown.is_cancelled() {
            return Err(LedgerError::Transport("ledger stopped".into()));
        }

        let sender = signer.identity();
        let nonce = self
            .state
            .lock()
            .await
            .nonces
            .get(&sender)
            .copied()
            .unwrap_or(0);

        let digest = call.signing_digest(self.config.chain_id, self.config.destination, nonce);
        let signature = signer.sign(&digest).await.map_err(Self::signer_error)?;

        let public_key = signer.public_key();
        if public_key.identity() != sender {
            return Err(LedgerError::Other("signing key does not match sender".into()));
        }
        public_key
            .verify(&digest, &signature)
            .map_err(|e| LedgerError::Other(e.to_string()))?;

        let mut state = self.state.lock().await;

        // Another write from the same sender got in while the wallet prompt was open.
        let current = state.nonces.get(&sender).copied().unwrap_or(0);
        if current != nonce {
            return Err(LedgerError::Other(format!(
                "nonce too low: signed {nonce}, expected {current}"
            )));
        }

        // Pre-flight against current state.
        if self.config.fee_per_write > 0 {
            let have = state.balances.get(&sender).copied().unwrap_or(0);
            let pending_fees = state
                .mempool
                .iter()
                .filter(|tx| tx.sender == sender)
                .count() as u64
                * self.config.fee_per_write;
            let need = pending_fees + self.config.fee_per_write;
            if have < need {
                return Err(LedgerError::InsufficientFunds { have, need });
            }
        }
        if matches!(call, LedgerCall::Submit(_)) && state.records.contains_key(&sender) {
            return Err(LedgerError::Reverted(REASON_ALREADY_SUBMITTED.into()));
        }

        let mut hasher = Sha256::new();
        hasher.update(digest);
        hasher.update(signature.as_bytes());
        let hash = TxHash(hasher.finalize().into());

        debug!(tx = %hash, sender = %sender.short(), call = call.name(), nonce, "Accepted transaction");

        state.nonces.insert(sender, nonce + 1);
        state.mempool.push(PendingTx { hash, sender, call });
        Ok(hash)
    }

    async fn wait_for_receipt(&self, hash: TxHash) -> Result<TxReceipt, LedgerError> {
        let start = Instant::now();
        let check_interval = (self.config.block_time / 4).max(Duration::from_millis(1));

        while start.elapsed() < self.config.receipt_timeout {
            // Handed out once.
            if let Some(receipt) = self.state.lock().await.receipts.remove(&hash) {
                return Ok(receipt);
            }
            if self.shutdown.is_cancelled() {
                return Err(LedgerError::Transport("ledger stopped".into()));
            }
            tokio::time::sleep(check_interval).await;
        }

        Err(LedgerError::ReceiptTimeout(
            hash,
            self.config.receipt_timeout.as_millis() as u64,
        ))
    }
}

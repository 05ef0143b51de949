//! Ledger Boundary
//!
//! The contract that stores one encrypted handle per identity, the ordered
//! participant list and the winner list. Reads are side-effect free; writes are
//! signed by the caller's wallet and confirmed by a receipt.
//!
//! ```text
//!   send(call, signer) ──sign──▶ pre-flight ──▶ mempool ──next block──▶ receipt
//!                          │          │                                   │
//!                    SignerRejected   └─ Reverted / InsufficientFunds     ▼
//!                                                           wait_for_receipt(hash)
//! ```

pub mod local;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use privwealth_handle::EncryptedHandle;
use privwealth_identity::{Address, Identity, Signer};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub use local::{LocalLedger, LocalLedgerConfig};

/// Revert reason the contract uses for a second submission.
pub const REASON_ALREADY_SUBMITTED: &str = "Already Amount Added";

const CALL_DOMAIN: &[u8] = b"PrivWealthCall/v1";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("User rejected the request.")]
    SignerRejected,
    #[error("insufficient funds for write: have {have}, need {need}")]
    InsufficientFunds { have: u64, need: u64 },
    #[error("execution reverted: {0}")]
    Reverted(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("no receipt for {0} after {1} ms")]
    ReceiptTimeout(TxHash, u64),
    #[error("{0}")]
    Other(String),
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxHash(pub [u8; 32]);

impl TxHash {
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({}..)", &self.to_hex()[..10])
    }
}

/// Contract write entry points.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LedgerCall {
    /// `submitWealth`
    Submit(EncryptedHandle),
    /// `richest`
    TriggerComparison,
    /// `resetArrays`
    ResetAll,
}

impl LedgerCall {
    pub fn name(&self) -> &'static str {
        match self {
            LedgerCall::Submit(_) => "submit",
            LedgerCall::TriggerComparison => "trigger_comparison",
            LedgerCall::ResetAll => "reset_all",
        }
    }

    /// What the wallet signs.
    ///
    /// SHA256( domain || chain_id || destination || sender nonce || call tag || handle id )
    pub fn signing_digest(&self, chain_id: u64, destination: Address, nonce: u64) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(CALL_DOMAIN);
        hasher.update(chain_id.to_be_bytes());
        hasher.update(destination.0);
        hasher.update(nonce.to_be_bytes());
        match self {
            LedgerCall::Submit(handle) => {
                hasher.update([0u8]);
                hasher.update(handle.id());
            }
            LedgerCall::TriggerComparison => hasher.update([1u8]),
            LedgerCall::ResetAll => hasher.update([2u8]),
        }
        hasher.finalize().into()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TxStatus {
    Success,
    Reverted(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxReceipt {
    pub hash: TxHash,
    /// Block the transaction was included in
    pub block: u64,
    pub status: TxStatus,
}

impl TxReceipt {
    /// Collapse a reverted receipt into the error a failed send would carry.
    pub fn into_result(self) -> Result<TxReceipt, LedgerError> {
        match &self.status {
            TxStatus::Success => Ok(self),
            TxStatus::Reverted(reason) => Err(LedgerError::Reverted(reason.clone())),
        }
    }
}

/// The contract as seen by the client.
pub trait Ledger: Send + Sync + 'static {
    /// `getWealthbyUser`
    fn get_own_handle(
        &self,
        owner: Identity,
    ) -> impl Future<Output = Result<Option<EncryptedHandle>, LedgerError>> + Send;

    /// `getParticipants`, in submission order
    fn get_participants(&self) -> impl Future<Output = Result<Vec<Identity>, LedgerError>> + Send;

    /// `getWinners`, empty until a comparison has resolved
    fn get_winners(&self) -> impl Future<Output = Result<Vec<Identity>, LedgerError>> + Send;

    /// Inclusion block of the newest comparison request whose outcome is
    /// reflected in `get_winners`; 0 if none has settled. A reset settles every
    /// request included before it.
    fn get_resolved_through(&self) -> impl Future<Output = Result<u64, LedgerError>> + Send;

    /// Sign and broadcast a write. Returns once the ledger accepted it for inclusion.
    fn send<S: Signer>(
        &self,
        call: LedgerCall,
        signer: &S,
    ) -> impl Future<Output = Result<TxHash, LedgerError>> + Send;

    fn wait_for_receipt(
        &self,
        hash: TxHash,
    ) -> impl Future<Output = Result<TxReceipt, LedgerError>> + Send;
}

impl<T: Ledger> Ledger for Arc<T> {
    fn get_own_handle(
        &self,
        owner: Identity,
    ) -> impl Future<Output = Result<Option<EncryptedHandle>, LedgerError>> + Send {
        (**self).get_own_handle(owner)
    }

    fn get_participants(&self) -> impl Future<Output = Result<Vec<Identity>, LedgerError>> + Send {
        (**self).get_participants()
    }

    fn get_winners(&self) -> impl Future<Output = Result<Vec<Identity>, LedgerError>> + Send {
        (**self).get_winners()
    }

    fn get_resolved_through(&self) -> impl Future<Output = Result<u64, LedgerError>> + Send {
        (**self).get_resolved_through()
    }

    fn send<S: Signer>(
        &self,
        call: LedgerCall,
        signer: &S,
    ) -> impl Future<Output = Result<TxHash, LedgerError>> + Send {
        (**self).send(call, signer)
    }

    fn wait_for_receipt(
        &self,
        hash: TxHash,
    ) -> impl Future<Output = Result<TxReceipt, LedgerError>> + Send {
        (**self).wait_for_receipt(hash)
    }
}

/// Send a write and wait for it to be included successfully.
pub async fn send_and_confirm<L: Ledger, S: Signer>(
    ledger: &L,
    call: LedgerCall,
    signer: &S,
) -> Result<TxReceipt, LedgerError> {
    let hash = ledger.send(call, signer).await?;
    ledger.wait_for_receipt(hash).await?.into_result()
}

//! PrivWealth Encryption Gateway
//!
//! Client side of the confidential-computation service.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  encrypt:  amount ──seal to network key──▶ EncryptedHandle       │
//! │            (bound to owner, destination, chain; no ledger trip)  │
//! │                                                                  │
//! │  reveal:   handle + fresh ephemeral key                          │
//! │              └─▶ owner signs RevealRequest (single use)          │
//! │                    └─▶ service checks owner, re-encrypts value   │
//! │                          to the ephemeral key                    │
//! │                            └─▶ client opens ─▶ plaintext         │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

pub mod client;
pub mod local;
pub mod request;

use std::future::Future;

use privwealth_handle::EncryptedHandle;
use privwealth_identity::{Address, Identity, Signer};
use thiserror::Error;

pub use client::GatewayClient;
pub use local::LocalConfidentialService;
pub use request::{NetworkKey, RevealRequest, SealedValue, SignedRevealRequest};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("encryption failed: {0}")]
    EncryptionFailure(String),
    #[error("reveal failed: {0}")]
    RevealFailure(String),
    #[error("not authorized: {0}")]
    NotAuthorized(String),
}

/// Turns amounts into owner-bound handles and handles back into amounts for
/// their owner only.
pub trait EncryptionGateway: Send + Sync + 'static {
    fn encrypt(
        &self,
        amount: u128,
        owner: Identity,
        destination: Address,
    ) -> impl Future<Output = Result<EncryptedHandle, GatewayError>> + Send;

    /// Each call produces a fresh single-use authorization signed by `signer`.
    fn reveal<S: Signer>(
        &self,
        handle: &EncryptedHandle,
        signer: &S,
    ) -> impl Future<Output = Result<u128, GatewayError>> + Send;
}

/// The external confidential-computation service boundary.
pub trait ConfidentialService: Send + Sync + 'static {
    fn network_key(&self) -> impl Future<Output = Result<NetworkKey, GatewayError>> + Send;

    fn reencrypt(
        &self,
        handle: &EncryptedHandle,
        request: SignedRevealRequest,
    ) -> impl Future<Output = Result<SealedValue, GatewayError>> + Send;
}

impl<T: ConfidentialService> ConfidentialService for std::sync::Arc<T> {
    fn network_key(&self) -> impl Future<Output = Result<NetworkKey, GatewayError>> + Send {
        (**self).network_key()
    }

    fn reencrypt(
        &self,
        handle: &EncryptedHandle,
        request: SignedRevealRequest,
    ) -> impl Future<Output = Result<SealedValue, GatewayError>> + Send {
        (**self).reencrypt(handle, request)
    }
}

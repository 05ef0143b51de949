use std::future::Future;
use std::sync::Arc;

use thiserror::Error;

use crate::{Identity, Keypair, PublicKey, Signature};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignerError {
    /// The holder declined the signature prompt.
    #[error("User rejected the request.")]
    Rejected,
    #[error("signer unavailable: {0}")]
    Unavailable(String),
}

/// The connected wallet.
///
/// Signing is a prompt to the identity's holder, so it is asynchronous and may
/// be declined.
pub trait Signer: Send + Sync {
    fn identity(&self) -> Identity;

    fn public_key(&self) -> PublicKey;

    fn sign(&self, message: &[u8]) -> impl Future<Output = Result<Signature, SignerError>> + Send;
}

impl Signer for Keypair {
    fn identity(&self) -> Identity {
        Keypair::identity(self)
    }

    fn public_key(&self) -> PublicKey {
        Keypair::public_key(self)
    }

    fn sign(&self, message: &[u8]) -> impl Future<Output = Result<Signature, SignerError>> + Send {
        let signature = self.sign_message(message);
        async move { Ok(signature) }
    }
}

impl<T: Signer> Signer for Arc<T> {
    fn identity(&self) -> Identity {
        (**self).identity()
    }

    fn public_key(&self) -> PublicKey {
        (**self).public_key()
    }

    fn sign(&self, message: &[u8]) -> impl Future<Output = Result<Signature, SignerError>> + Send {
        (**self).sign(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn keypair_signer_produces_verifiable_signature() {
        let kp = Arc::new(Keypair::from_seed(&[3u8; 32]));
        let sig = kp.sign(b"submit").await.unwrap();
        assert!(Signer::public_key(&kp).verify(b"submit", &sig).is_ok());
        assert_eq!(Signer::identity(&kp), kp.identity());
    }
}

use chacha20poly1305::aead::rand_core::OsRng;
use privwealth_handle::{EncryptedHandle, HandleContext, seal_amount};
use privwealth_identity::{Address, Identity, Signer, SignerError};
use x25519_dalek::{EphemeralSecret, PublicKey};

use crate::request::{RevealRequest, SignedRevealRequest};
use crate::{ConfidentialService, EncryptionGateway, GatewayError};

/// [`EncryptionGateway`] backed by a [`ConfidentialService`].
pub struct GatewayClient<C> {
    service: C,
}

impl<C: ConfidentialService> GatewayClient<C> {
    pub fn new(service: C) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &C {
        &self.service
    }
}

impl<C: ConfidentialService> EncryptionGateway for GatewayClient<C> {
    async fn encrypt(
        &self,
        amount: u128,
        owner: Identity,
        destination: Address,
    ) -> Result<EncryptedHandle, GatewayError> {
        let network = self.service.network_key().await.map_err(|e| match e {
            GatewayError::EncryptionFailure(msg) => GatewayError::EncryptionFailure(msg),
            other => GatewayError::EncryptionFailure(other.to_string()),
        })?;

        let context = HandleContext::new(owner, destination, network.chain_id);
        seal_amount(amount, context, &PublicKey::from(network.public_key))
            .map_err(|e| GatewayError::EncryptionFailure(e.to_string()))
    }

    async fn reveal<S: Signer>(
        &self,
        handle: &EncryptedHandle,
        signer: &S,
    ) -> Result<u128, GatewayError> {
        // No point prompting a signer the service will refuse anyway.
        if signer.identity() != handle.owner() {
            return Err(GatewayError::NotAuthorized(format!(
                "{} does not own this handle",
                signer.identity().short()
            )));
        }

        let reply_secret = EphemeralSecret::random_from_rng(OsRng);
        let reply_key = PublicKey::from(&reply_secret);

        let request = RevealRequest::new(
            handle.id(),
            handle.owner(),
            signer.public_key(),
            handle.context.destination,
            handle.context.chain_id,
            *reply_key.as_bytes(),
        );

        let signature = signer
            .sign(&request.digest())
            .await
            .map_err(|e| match e {
                SignerError::Rejected => {
                    GatewayError::NotAuthorized("reveal signature declined".into())
                }
                SignerError::Unavailable(msg) => GatewayError::RevealFailure(msg),
            })?;

        let sealed = self
            .service
            .reencrypt(
                handle,
                SignedRevealRequest {
                    request: request.clone(),
                    signature,
                },
            )
            .await?;

        sealed
            .open(reply_secret, &request)
            .ok_or_else(|| GatewayError::RevealFailure("sealed reply did not open".into()))
    }
}

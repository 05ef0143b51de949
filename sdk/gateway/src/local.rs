//! In-process confidential-computation service.
//!
//! Holds the network secret. Stands in for the external service in tests and
//! in the CLI demo; the ledger uses [`LocalConfidentialService::max_indices`]
//! as its comparison engine.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chacha20poly1305::aead::rand_core::OsRng;
use privwealth_handle::{EncryptedHandle, open_amount};
use privwealth_identity::{Address, Identity};
use tokio::sync::Mutex;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::request::{
    NetworkKey, REVEAL_VALIDITY_SECS, SealedValue, SignedRevealRequest, unix_now,
};
use crate::{ConfidentialService, GatewayError};

pub struct LocalConfidentialService {
    secret: StaticSecret,
    public: PublicKey,
    chain_id: u64,
    available: AtomicBool,
    /// Authorization nonces already honoured, with their expiry. Expired
    /// entries are pruned; their requests fail the expiry check anyway.
    used_nonces: Mutex<HashMap<[u8; 16], u64>>,
    reveals_served: AtomicU64,
}

impl LocalConfidentialService {
    pub fn new(chain_id: u64) -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self {
            secret,
            public,
            chain_id,
            available: AtomicBool::new(true),
            used_nonces: Mutex::new(HashMap::new()),
            reveals_served: AtomicU64::new(0),
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Simulate the service going down (or coming back).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Spent authorizations still tracked for replay protection.
    pub async fn tracked_authorizations(&self) -> usize {
        self.used_nonces.lock().await.len()
    }

    /// Number of reveals that passed authorization.
    pub fn reveals_served(&self) -> u64 {
        self.reveals_served.load(Ordering::SeqCst)
    }

    /// Plaintext of `handle` for in-network computation.
    ///
    /// Caller beware: a handle that is malformed, bound to another owner,
    /// destination or chain, or fails authentication counts as zero instead of
    /// being rejected.
    pub fn evaluate(&self, handle: &EncryptedHandle, owner: Identity, destination: Address) -> u128 {
        let ctx = &handle.context;
        if ctx.owner != owner || ctx.destination != destination || ctx.chain_id != self.chain_id {
            return 0;
        }
        open_amount(handle, &self.secret).unwrap_or(0)
    }

    /// Indices of every entry holding the maximum value, in input order.
    pub fn max_indices(&self, entries: &[(Identity, EncryptedHandle)], destination: Address) -> Vec<usize> {
        let values: Vec<u128> = entries
            .iter()
            .map(|(owner, handle)| self.evaluate(handle, *owner, destination))
            .collect();

        let Some(max) = values.iter().copied().max() else {
            return Vec::new();
        };

        values
            .iter()
            .enumerate()
            .filter(|(_, v)| **v == max)
            .map(|(i, _)| i)
            .collect()
    }

    fn authorize(
        &self,
        handle: &EncryptedHandle,
        signed: &SignedRevealRequest,
    ) -> Result<(), GatewayError> {
        let req = &signed.request;

        req.signer_key
            .verify(&req.digest(), &signed.signature)
            .map_err(|e| GatewayError::NotAuthorized(e.to_string()))?;

        if req.signer_key.identity() != req.owner {
            return Err(GatewayError::NotAuthorized(
                "signing key does not belong to the claimed identity".into(),
            ));
        }
        if req.owner != handle.owner() {
            return Err(GatewayError::NotAuthorized(format!(
                "{} does not own this handle",
                req.owner.short()
            )));
        }
        let now = unix_now();
        if req.expires_at < now {
            return Err(GatewayError::NotAuthorized("authorization expired".into()));
        }
        if req.expires_at > now + REVEAL_VALIDITY_SECS {
            return Err(GatewayError::NotAuthorized(
                "authorization validity too long".into(),
            ));
        }
        if req.handle_id != handle.id()
            || req.destination != handle.context.destination
            || req.chain_id != handle.context.chain_id
            || req.chain_id != self.chain_id
        {
            return Err(GatewayError::NotAuthorized(
                "authorization is scoped to a different handle".into(),
            ));
        }
        Ok(())
    }
}

impl ConfidentialService for LocalConfidentialService {
    async fn network_key(&self) -> Result<NetworkKey, GatewayError> {
        if !self.is_available() {
            return Err(GatewayError::EncryptionFailure(
                "confidential service unreachable".into(),
            ));
        }
        Ok(NetworkKey {
            public_key: *self.public.as_bytes(),
            chain_id: self.chain_id,
        })
    }

    async fn reencrypt(
        &self,
        handle: &EncryptedHandle,
        request: SignedRevealRequest,
    ) -> Result<SealedValue, GatewayError> {
        if !self.is_available() {
            return Err(GatewayError::RevealFailure(
                "confidential service unreachable".into(),
            ));
        }

        self.authorize(handle, &request)?;

        {
            let mut used = self.used_nonces.lock().await;
            let now = unix_now();
            used.retain(|_, expires_at| *expires_at >= now);
            if used.contains_key(&request.request.nonce) {
                return Err(GatewayError::NotAuthorized(
                    "authorization already used".into(),
                ));
            }
            used.insert(request.request.nonce, request.request.expires_at);
        }

        let value = open_amount(handle, &self.secret)
            .map_err(|e| GatewayError::RevealFailure(e.to_string()))?;

        let sealed = SealedValue::seal(value, &request.request)
            .ok_or_else(|| GatewayError::RevealFailure("failed to seal reply".into()))?;

        self.reveals_served.fetch_add(1, Ordering::SeqCst);
        Ok(sealed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RevealRequest;
    use crate::{EncryptionGateway, GatewayClient};
    use privwealth_identity::{Keypair, Signer};
    use std::sync::Arc;

    const CHAIN: u64 = 84532;

    fn destination() -> Address {
        Address([0x5f; 20])
    }

    fn gateway() -> (Arc<LocalConfidentialService>, GatewayClient<Arc<LocalConfidentialService>>) {
        let service = Arc::new(LocalConfidentialService::new(CHAIN));
        (service.clone(), GatewayClient::new(service))
    }

    #[tokio::test]
    async fn test_encrypt_reveal_roundtrip() {
        let (_, gw) = gateway();
        let alice = Keypair::from_seed(&[1u8; 32]);

        for v in [0u128, 1, 100, 250, u128::MAX] {
            let handle = gw.encrypt(v, alice.identity(), destination()).await.unwrap();
            assert_eq!(handle.owner(), alice.identity());
            assert_eq!(gw.reveal(&handle, &alice).await.unwrap(), v);
        }
    }

    #[tokio::test]
    async fn test_reveal_by_other_identity_is_not_authorized() {
        let (service, gw) = gateway();
        let alice = Keypair::from_seed(&[1u8; 32]);
        let mallory = Keypair::from_seed(&[2u8; 32]);

        let handle = gw.encrypt(100, alice.identity(), destination()).await.unwrap();
        let err = gw.reveal(&handle, &mallory).await.unwrap_err();
        assert!(matches!(err, GatewayError::NotAuthorized(_)));
        assert_eq!(service.reveals_served(), 0);
    }

    #[tokio::test]
    async fn test_service_rejects_forged_owner_claim() {
        let (service, gw) = gateway();
        let alice = Keypair::from_seed(&[1u8; 32]);
        let mallory = Keypair::from_seed(&[2u8; 32]);
        let handle = gw.encrypt(100, alice.identity(), destination()).await.unwrap();

        // Mallory claims to be Alice but signs with her own key.
        let request = RevealRequest::new(
            handle.id(),
            alice.identity(),
            mallory.public_key(),
            destination(),
            CHAIN,
            [9u8; 32],
        );
        let signature = mallory.sign(&request.digest()).await.unwrap();
        let err = service
            .reencrypt(&handle, SignedRevealRequest { request, signature })
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::NotAuthorized(_)));
    }

    #[tokio::test]
    async fn test_authorization_is_single_use() {
        let (service, gw) = gateway();
        let alice = Keypair::from_seed(&[1u8; 32]);
        let handle = gw.encrypt(7, alice.identity(), destination()).await.unwrap();

        let request = RevealRequest::new(
            handle.id(),
            alice.identity(),
            alice.public_key(),
            destination(),
            CHAIN,
            [9u8; 32],
        );
        let signature = alice.sign(&request.digest()).await.unwrap();
        let signed = SignedRevealRequest { request, signature };

        assert!(service.reencrypt(&handle, signed.clone()).await.is_ok());
        let replay = service.reencrypt(&handle, signed).await.unwrap_err();
        assert_eq!(
            replay,
            GatewayError::NotAuthorized("authorization already used".into())
        );
    }

    async fn signed(
        who: &Keypair,
        handle: &EncryptedHandle,
        expires_at: u64,
    ) -> SignedRevealRequest {
        let mut request = RevealRequest::new(
            handle.id(),
            who.identity(),
            who.public_key(),
            destination(),
            CHAIN,
            [9u8; 32],
        );
        request.expires_at = expires_at;
        let signature = who.sign(&request.digest()).await.unwrap();
        SignedRevealRequest { request, signature }
    }

    #[tokio::test]
    async fn test_expired_or_overlong_authorization_is_refused() {
        let (service, gw) = gateway();
        let alice = Keypair::from_seed(&[1u8; 32]);
        let handle = gw.encrypt(7, alice.identity(), destination()).await.unwrap();
        let now = unix_now();

        let stale = signed(&alice, &handle, now - 1).await;
        assert_eq!(
            service.reencrypt(&handle, stale).await.unwrap_err(),
            GatewayError::NotAuthorized("authorization expired".into())
        );
        let forever = signed(&alice, &handle, now + 10 * REVEAL_VALIDITY_SECS).await;
        assert_eq!(
            service.reencrypt(&handle, forever).await.unwrap_err(),
            GatewayError::NotAuthorized("authorization validity too long".into())
        );
        assert_eq!(service.tracked_authorizations().await, 0);
    }

    #[tokio::test]
    async fn test_spent_authorizations_are_pruned_after_expiry() {
        let (service, gw) = gateway();
        let alice = Keypair::from_seed(&[1u8; 32]);
        let handle = gw.encrypt(7, alice.identity(), destination()).await.unwrap();

        let short = signed(&alice, &handle, unix_now() + 1).await;
        service.reencrypt(&handle, short.clone()).await.unwrap();
        assert_eq!(service.tracked_authorizations().await, 1);

        tokio::time::sleep(std::time::Duration::from_millis(2_100)).await;
        // The old authorization is now refused on expiry, not on replay.
        assert_eq!(
            service.reencrypt(&handle, short).await.unwrap_err(),
            GatewayError::NotAuthorized("authorization expired".into())
        );
        gw.reveal(&handle, &alice).await.unwrap();
        assert_eq!(service.tracked_authorizations().await, 1);
    }

    #[tokio::test]
    async fn test_unreachable_service() {
        let (service, gw) = gateway();
        let alice = Keypair::from_seed(&[1u8; 32]);
        let handle = gw.encrypt(5, alice.identity(), destination()).await.unwrap();

        service.set_available(false);
        assert!(matches!(
            gw.encrypt(5, alice.identity(), destination()).await,
            Err(GatewayError::EncryptionFailure(_))
        ));
        assert!(matches!(
            gw.reveal(&handle, &alice).await,
            Err(GatewayError::RevealFailure(_))
        ));
    }

    #[tokio::test]
    async fn test_max_indices_reports_ties_in_order() {
        let (service, gw) = gateway();
        let a = Keypair::from_seed(&[1u8; 32]).identity();
        let b = Keypair::from_seed(&[2u8; 32]).identity();
        let c = Keypair::from_seed(&[3u8; 32]).identity();

        let entries = vec![
            (a, gw.encrypt(250, a, destination()).await.unwrap()),
            (b, gw.encrypt(100, b, destination()).await.unwrap()),
            (c, gw.encrypt(250, c, destination()).await.unwrap()),
        ];
        assert_eq!(service.max_indices(&entries, destination()), vec![0, 2]);
        assert!(service.max_indices(&[], destination()).is_empty());
    }

    #[tokio::test]
    async fn test_foreign_handle_counts_as_zero() {
        let (service, gw) = gateway();
        let a = Keypair::from_seed(&[1u8; 32]).identity();
        let b = Keypair::from_seed(&[2u8; 32]).identity();

        let handle = gw.encrypt(1_000, a, destination()).await.unwrap();
        // b submits a's handle: bound to a, so it is worth nothing to b
        assert_eq!(service.evaluate(&handle, b, destination()), 0);
        assert_eq!(service.evaluate(&handle, a, Address([1u8; 20])), 0);
        assert_eq!(service.evaluate(&handle, a, destination()), 1_000);
    }
}

//! Reveal authorization and the sealed reply.

use chacha20poly1305::{
    ChaCha20Poly1305,
    aead::{Aead, KeyInit, Payload},
};
use std::time::{SystemTime, UNIX_EPOCH};

use chacha20poly1305::aead::rand_core::{OsRng, RngCore};
use hkdf::Hkdf;
use privwealth_identity::{Address, Identity, PublicKey, Signature};
use sha2::{Digest, Sha256};
use x25519_dalek::{EphemeralSecret, PublicKey as X25519PublicKey};

const REVEAL_DOMAIN: &[u8] = b"PrivWealthReveal/v1";

/// How long a signed reveal authorization stays valid.
pub const REVEAL_VALIDITY_SECS: u64 = 120;

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// What a client needs to encrypt to the network.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NetworkKey {
    pub public_key: [u8; 32],
    pub chain_id: u64,
}

/// Structured message the owner signs to obtain one reveal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RevealRequest {
    pub handle_id: [u8; 32],
    pub owner: Identity,
    pub signer_key: PublicKey,
    pub destination: Address,
    pub chain_id: u64,
    /// x25519 key the plaintext is re-encrypted to
    pub reply_key: [u8; 32],
    /// Makes the authorization single use
    pub nonce: [u8; 16],
    /// Unix seconds after which the service refuses it
    pub expires_at: u64,
}

impl RevealRequest {
    pub fn new(
        handle_id: [u8; 32],
        owner: Identity,
        signer_key: PublicKey,
        destination: Address,
        chain_id: u64,
        reply_key: [u8; 32],
    ) -> Self {
        let mut nonce = [0u8; 16];
        OsRng.fill_bytes(&mut nonce);
        Self {
            handle_id,
            owner,
            signer_key,
            destination,
            chain_id,
            reply_key,
            nonce,
            expires_at: unix_now() + REVEAL_VALIDITY_SECS,
        }
    }

    /// SHA256( domain || handle_id || owner || signer_key || destination || chain_id || reply_key || nonce || expires_at )
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(REVEAL_DOMAIN);
        hasher.update(self.handle_id);
        hasher.update(self.owner.0);
        hasher.update(self.signer_key.0);
        hasher.update(self.destination.0);
        hasher.update(self.chain_id.to_be_bytes());
        hasher.update(self.reply_key);
        hasher.update(self.nonce);
        hasher.update(self.expires_at.to_be_bytes());
        hasher.finalize().into()
    }
}

#[derive(Clone, Debug)]
pub struct SignedRevealRequest {
    pub request: RevealRequest,
    pub signature: Signature,
}

/// Plaintext re-encrypted to a reply key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SealedValue {
    pub service_key: [u8; 32],
    pub nonce: [u8; 12],
    /// ciphertext || tag
    pub ciphertext: Vec<u8>,
}

fn reply_key(shared: &[u8; 32], handle_id: &[u8; 32]) -> [u8; 32] {
    let hk = Hkdf::<Sha256>::new(Some(handle_id), shared);
    let mut key = [0u8; 32];
    hk.expand(b"privwealth-reveal-v1", &mut key)
        .expect("HKDF expand failed");
    key
}

impl SealedValue {
    pub(crate) fn seal(value: u128, request: &RevealRequest) -> Option<Self> {
        let secret = EphemeralSecret::random_from_rng(OsRng);
        let service_key = X25519PublicKey::from(&secret);
        let shared = secret.diffie_hellman(&X25519PublicKey::from(request.reply_key));

        let mut nonce = [0u8; 12];
        OsRng.fill_bytes(&mut nonce);

        let key = reply_key(shared.as_bytes(), &request.handle_id);
        let cipher = ChaCha20Poly1305::new(&key.into());
        let ciphertext = cipher
            .encrypt(
                &nonce.into(),
                Payload {
                    msg: &value.to_le_bytes(),
                    aad: &request.nonce,
                },
            )
            .ok()?;

        Some(Self {
            service_key: *service_key.as_bytes(),
            nonce,
            ciphertext,
        })
    }

    pub(crate) fn open(&self, reply_secret: EphemeralSecret, request: &RevealRequest) -> Option<u128> {
        let shared = reply_secret.diffie_hellman(&X25519PublicKey::from(self.service_key));
        let key = reply_key(shared.as_bytes(), &request.handle_id);
        let cipher = ChaCha20Poly1305::new(&key.into());
        let plaintext = cipher
            .decrypt(
                &self.nonce.into(),
                Payload {
                    msg: &self.ciphertext,
                    aad: &request.nonce,
                },
            )
            .ok()?;
        let bytes: [u8; 16] = plaintext.as_slice().try_into().ok()?;
        Some(u128::from_le_bytes(bytes))
    }
}

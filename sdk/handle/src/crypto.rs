use chacha20poly1305::{
    ChaCha20Poly1305,
    aead::{Aead, KeyInit, Payload},
};
use chacha20poly1305::aead::rand_core::{OsRng, RngCore};
use hkdf::Hkdf;
use sha2::Sha256;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use crate::types::{EncryptedHandle, HANDLE_VERSION_V1, HandleContext, HandleError};

const TAG_LEN: usize = 16;

fn derive_aead_key(shared: &[u8; 32]) -> [u8; 32] {
    let hk = Hkdf::<Sha256>::new(None, shared);

    let mut key = [0u8; 32];
    hk.expand(b"privwealth-handle-v1", &mut key)
        .expect("HKDF expand failed");
    key
}

/// Encrypts `amount` to the network key, bound to `context`.
///
/// Purely local: no ledger round trip is involved.
pub fn seal_amount(
    amount: u128,
    context: HandleContext,
    network_pub: &PublicKey,
) -> Result<EncryptedHandle, HandleError> {
    let sender_secret = EphemeralSecret::random_from_rng(OsRng);
    let sender_key = PublicKey::from(&sender_secret);
    let shared = sender_secret.diffie_hellman(network_pub);

    let mut nonce = [0u8; 12];
    OsRng.fill_bytes(&mut nonce);

    let key = derive_aead_key(shared.as_bytes());
    let cipher = ChaCha20Poly1305::new(&key.into());
    let aad = context.associated_data(HANDLE_VERSION_V1);

    let encrypted = cipher
        .encrypt(
            &nonce.into(),
            Payload {
                msg: &amount.to_le_bytes(),
                aad: &aad,
            },
        )
        .map_err(|_| HandleError::EncryptionFailed)?;

    let split = encrypted.len() - TAG_LEN;
    let (ciphertext, tag) = encrypted.split_at(split);

    Ok(EncryptedHandle {
        version: HANDLE_VERSION_V1,
        context,
        sender_key: *sender_key.as_bytes(),
        nonce,
        ciphertext: ciphertext.to_vec(),
        tag: tag.try_into().map_err(|_| HandleError::EncryptionFailed)?,
    })
}

/// Opens a handle with the network secret. Only the confidential-computation
/// service holds that secret.
pub fn open_amount(
    handle: &EncryptedHandle,
    network_secret: &StaticSecret,
) -> Result<u128, HandleError> {
    if handle.version != HANDLE_VERSION_V1 {
        return Err(HandleError::UnsupportedVersion(handle.version));
    }

    let shared = network_secret.diffie_hellman(&PublicKey::from(handle.sender_key));
    let key = derive_aead_key(shared.as_bytes());
    let cipher = ChaCha20Poly1305::new(&key.into());
    let aad = handle.context.associated_data(handle.version);

    let mut combined = handle.ciphertext.clone();
    combined.extend_from_slice(&handle.tag);

    let plaintext = cipher
        .decrypt(
            &handle.nonce.into(),
            Payload {
                msg: &combined,
                aad: &aad,
            },
        )
        .map_err(|_| HandleError::DecryptionFailed)?;

    let bytes: [u8; 16] = plaintext
        .as_slice()
        .try_into()
        .map_err(|_| HandleError::InvalidPlaintext)?;
    Ok(u128::from_le_bytes(bytes))
}

use std::fmt;

use privwealth_identity::{Address, Identity};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use wincode::{SchemaRead, SchemaWrite};

pub const HANDLE_VERSION_V1: u8 = 1;

/// Characters of hex shown before the ellipsis in a preview.
const PREVIEW_LEN: usize = 32;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandleError {
    #[error("handle serialization failed")]
    SerializationFailed,
    #[error("handle deserialization failed")]
    DeserializationFailed,
    #[error("invalid handle hex: {0}")]
    InvalidHex(String),
    #[error("unsupported handle version {0}")]
    UnsupportedVersion(u8),
    #[error("encryption failed")]
    EncryptionFailed,
    #[error("decryption failed")]
    DecryptionFailed,
    #[error("plaintext is not a 16-byte amount")]
    InvalidPlaintext,
}

/// Who a handle belongs to and where it may be used.
///
/// Authenticated as associated data, so it cannot be rewritten without
/// breaking decryption.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, SchemaRead, SchemaWrite,
)]
pub struct HandleContext {
    pub owner: Identity,
    pub destination: Address,
    pub chain_id: u64,
}

impl HandleContext {
    pub fn new(owner: Identity, destination: Address, chain_id: u64) -> Self {
        Self {
            owner,
            destination,
            chain_id,
        }
    }

    /// version || owner || destination || chain_id (BE)
    pub fn associated_data(&self, version: u8) -> [u8; 61] {
        let mut aad = [0u8; 61];
        aad[0] = version;
        aad[1..33].copy_from_slice(&self.owner.0);
        aad[33..53].copy_from_slice(&self.destination.0);
        aad[53..].copy_from_slice(&self.chain_id.to_be_bytes());
        aad
    }
}

/// Opaque reference to an encrypted amount.
#[derive(
    Clone, PartialEq, Eq, Hash, Serialize, Deserialize, SchemaRead, SchemaWrite,
)]
pub struct EncryptedHandle {
    pub version: u8,
    pub context: HandleContext,
    /// Sender's one-off x25519 key, used with the network key to derive the AEAD key
    pub sender_key: [u8; 32],
    pub nonce: [u8; 12],
    pub ciphertext: Vec<u8>,
    pub tag: [u8; 16],
}

impl EncryptedHandle {
    pub fn owner(&self) -> Identity {
        self.context.owner
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, HandleError> {
        wincode::serialize(self).map_err(|_| HandleError::SerializationFailed)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, HandleError> {
        let handle = wincode::deserialize::<EncryptedHandle>(bytes)
            .map_err(|_| HandleError::DeserializationFailed)?;
        if handle.version != HANDLE_VERSION_V1 {
            return Err(HandleError::UnsupportedVersion(handle.version));
        }
        Ok(handle)
    }

    /// `0x`-prefixed hex of the serialized handle. This is what users copy.
    pub fn to_hex(&self) -> String {
        match self.to_bytes() {
            Ok(bytes) => format!("0x{}", hex::encode(bytes)),
            Err(_) => String::from("0x"),
        }
    }

    pub fn from_hex(s: &str) -> Result<Self, HandleError> {
        let trimmed = s.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(digits).map_err(|e| HandleError::InvalidHex(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// H(serialized handle)
    pub fn id(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.to_bytes().unwrap_or_default());
        hasher.finalize().into()
    }

    /// Truncated hex for display, e.g. `0x0101aa...`.
    pub fn preview(&self) -> String {
        let full = self.to_hex();
        if full.len() <= PREVIEW_LEN {
            return full;
        }
        format!("{}...", &full[..PREVIEW_LEN])
    }
}

impl fmt::Display for EncryptedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for EncryptedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedHandle")
            .field("owner", &self.context.owner)
            .field("preview", &self.preview())
            .finish_non_exhaustive()
    }
}

pub mod keypair;
pub mod signer;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use wincode::{SchemaRead, SchemaWrite};

pub use keypair::{Keypair, PublicKey, Signature};
pub use signer::{Signer, SignerError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),
    #[error("invalid length: expected {expected} bytes, got {got}")]
    InvalidLength { expected: usize, got: usize },
    #[error("invalid ed25519 public key")]
    InvalidPublicKey,
    #[error("signature verification failed")]
    BadSignature,
}

/// The account a signer acts as.
///
/// Formula: SHA256( ed25519 verifying key )
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, SchemaRead, SchemaWrite, Serialize, Deserialize,
)]
pub struct Identity(pub [u8; 32]);

impl Identity {
    pub fn from_public_key(pk: &[u8; 32]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(pk);
        Identity(hasher.finalize().into())
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// `0x1234...abcd`, as shown in participant lists.
    pub fn short(&self) -> String {
        let full = self.to_hex();
        format!("{}...{}", &full[..6], &full[full.len() - 4..])
    }
}

impl AsRef<[u8]> for Identity {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self.short())
    }
}

impl FromStr for Identity {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Identity(decode_fixed::<32>(s)?))
    }
}

/// Contract address a handle is bound to (the destination context).
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, SchemaRead, SchemaWrite, Serialize, Deserialize,
)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_hex())
    }
}

impl FromStr for Address {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Address(decode_fixed::<20>(s)?))
    }
}

/// Decode optionally `0x`-prefixed hex into exactly `N` bytes.
pub fn decode_fixed<const N: usize>(s: &str) -> Result<[u8; N], IdentityError> {
    let trimmed = s.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let bytes = hex::decode(digits).map_err(|e| IdentityError::InvalidHex(e.to_string()))?;
    let got = bytes.len();
    bytes
        .try_into()
        .map_err(|_| IdentityError::InvalidLength { expected: N, got })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_hex_roundtrip() {
        let id = Identity([0xab; 32]);
        let parsed: Identity = id.to_hex().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn short_form_keeps_prefix_and_suffix() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0x12;
        bytes[1] = 0x34;
        bytes[31] = 0xcd;
        let short = Identity(bytes).short();
        assert_eq!(short, "0x1234...00cd");
    }

    #[test]
    fn address_rejects_wrong_length() {
        let err = "0x1234".parse::<Address>().unwrap_err();
        assert_eq!(
            err,
            IdentityError::InvalidLength {
                expected: 20,
                got: 2
            }
        );
    }

    #[test]
    fn address_accepts_mixed_case() {
        let addr: Address = "0x5FbDB2315678afecb367f032d93F642f64180aa3".parse().unwrap();
        assert_eq!(addr.to_hex(), "0x5fbdb2315678afecb367f032d93f642f64180aa3");
    }
}

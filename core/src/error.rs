//! Errors surfaced by the controllers.

use privwealth_gateway::GatewayError;
use thiserror::Error;

use crate::ledger::{LedgerError, REASON_ALREADY_SUBMITTED};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WealthError {
    #[error("invalid amount: {0}")]
    ValidationError(String),
    #[error("encryption failed: {0}")]
    EncryptionFailure(String),
    #[error("reveal failed: {0}")]
    RevealFailure(String),
    #[error("not authorized: {0}")]
    NotAuthorized(String),
    #[error("identity has already submitted")]
    AlreadySubmitted,
    #[error("signer rejected the request")]
    SignerRejected,
    #[error("insufficient resources: {0}")]
    InsufficientResources(String),
    #[error("transaction failed: {0}")]
    TransactionFailed(String),
    #[error("transport error: {0}")]
    TransportError(String),

    #[error("{0} already in progress")]
    Busy(&'static str),
    #[error("result discarded: session changed while the operation was in flight")]
    Superseded,
    #[error("no identity connected")]
    NoIdentity,
    #[error("no pending handle; confirm an amount first")]
    NoPendingHandle,
    #[error("no submission recorded for this identity")]
    NoRecord,
    #[error("signer does not match the connected identity")]
    IdentityMismatch,
    #[error("confirmation text did not match")]
    ConfirmationRequired,
}

impl WealthError {
    /// The text shown to the user for this error.
    pub fn user_message(&self) -> String {
        match self {
            WealthError::ValidationError(_) => {
                "Please enter a valid amount greater than 0.".into()
            }
            WealthError::EncryptionFailure(_) => "Failed to encrypt the value.".into(),
            WealthError::RevealFailure(_) => "Decryption failed".into(),
            WealthError::NotAuthorized(_) => {
                "You are not authorized to view this value.".into()
            }
            WealthError::AlreadySubmitted => {
                "You have already submitted your wealth. Each address can only submit once."
                    .into()
            }
            WealthError::SignerRejected => "Transaction was rejected. Please try again.".into(),
            WealthError::InsufficientResources(_) => {
                "Insufficient funds to complete the transaction.".into()
            }
            WealthError::TransactionFailed(_) => {
                "Failed to submit wealth. Please try again.".into()
            }
            WealthError::TransportError(_) => "Transaction failed".into(),
            WealthError::Busy(op) => format!("Please wait, {op} is already in progress."),
            WealthError::Superseded => "The request was cancelled.".into(),
            WealthError::NoIdentity => "Please connect your wallet to submit wealth.".into(),
            WealthError::NoPendingHandle => "Please confirm your amount first.".into(),
            WealthError::NoRecord => "No wealth submitted yet.".into(),
            WealthError::IdentityMismatch => {
                "The connected wallet changed. Please try again.".into()
            }
            WealthError::ConfirmationRequired => {
                "Are you sure you want to reset all data? This action cannot be undone.".into()
            }
        }
    }
}

/// Map a ledger failure to the user-facing class.
///
/// Reasons are matched on their text, since wallets and nodes wrap the
/// contract's revert reason in their own messages.
pub fn classify(err: LedgerError) -> WealthError {
    match err {
        LedgerError::SignerRejected => WealthError::SignerRejected,
        LedgerError::Transport(msg) => WealthError::TransportError(msg),
        other => {
            let msg = other.to_string();
            let lower = msg.to_lowercase();
            if msg.contains(REASON_ALREADY_SUBMITTED) {
                WealthError::AlreadySubmitted
            } else if lower.contains("user rejected") {
                WealthError::SignerRejected
            } else if lower.contains("insufficient funds") {
                WealthError::InsufficientResources(msg)
            } else {
                WealthError::TransactionFailed(msg)
            }
        }
    }
}

impl From<GatewayError> for WealthError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::EncryptionFailure(msg) => WealthError::EncryptionFailure(msg),
            GatewayError::RevealFailure(msg) => WealthError::RevealFailure(msg),
            GatewayError::NotAuthorized(msg) => WealthError::NotAuthorized(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::TxHash;

    #[test]
    fn test_classify_known_reasons() {
        assert_eq!(
            classify(LedgerError::Reverted(REASON_ALREADY_SUBMITTED.into())),
            WealthError::AlreadySubmitted
        );
        assert_eq!(
            classify(LedgerError::Other(
                "execution reverted: reason=\"Already Amount Added\"".into()
            )),
            WealthError::AlreadySubmitted
        );
        assert_eq!(classify(LedgerError::SignerRejected), WealthError::SignerRejected);
        assert_eq!(
            classify(LedgerError::Other("MetaMask Tx Signature: User rejected the request.".into())),
            WealthError::SignerRejected
        );
        assert!(matches!(
            classify(LedgerError::InsufficientFunds { have: 0, need: 1 }),
            WealthError::InsufficientResources(_)
        ));
        assert!(matches!(
            classify(LedgerError::Transport("reset by peer".into())),
            WealthError::TransportError(_)
        ));
    }

    #[test]
    fn test_classify_falls_back_to_transaction_failed() {
        assert!(matches!(
            classify(LedgerError::Reverted("out of gas".into())),
            WealthError::TransactionFailed(_)
        ));
        assert!(matches!(
            classify(LedgerError::ReceiptTimeout(TxHash([0u8; 32]), 100)),
            WealthError::TransactionFailed(_)
        ));
    }

    #[test]
    fn test_user_messages() {
        assert_eq!(
            WealthError::AlreadySubmitted.user_message(),
            "You have already submitted your wealth. Each address can only submit once."
        );
        assert_eq!(
            WealthError::ValidationError("abc".into()).user_message(),
            "Please enter a valid amount greater than 0."
        );
        assert_eq!(
            WealthError::NoIdentity.user_message(),
            "Please connect your wallet to submit wealth."
        );
    }
}

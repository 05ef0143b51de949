use std::sync::Arc;

use privwealth_identity::Signer;
use tracing::{info, warn};

use crate::bus::{UpdateBus, UpdateKind};
use crate::error::{WealthError, classify};
use crate::inflight::InFlight;
use crate::ledger::{Ledger, LedgerCall, TxReceipt, send_and_confirm};

/// Text the user must type to clear everything.
pub const RESET_PHRASE: &str = "RESET";

/// Proof that the user confirmed a full reset.
#[derive(Debug)]
pub struct ResetConfirmation(());

impl ResetConfirmation {
    pub fn acknowledge(typed: &str) -> Result<Self, WealthError> {
        if typed.trim() == RESET_PHRASE {
            Ok(Self(()))
        } else {
            Err(WealthError::ConfirmationRequired)
        }
    }
}

/// Clears every submission, the participant list and the winners.
pub struct ResetController<L> {
    ledger: Arc<L>,
    bus: UpdateBus,
    resetting: InFlight,
}

impl<L: Ledger> ResetController<L> {
    pub fn new(ledger: Arc<L>, bus: UpdateBus) -> Self {
        Self {
            ledger,
            bus,
            resetting: InFlight::new(),
        }
    }

    /// Read controllers drop their caches when they see the reset signal.
    pub async fn reset<S: Signer>(
        &self,
        signer: &S,
        _confirmation: ResetConfirmation,
    ) -> Result<TxReceipt, WealthError> {
        let _guard = self
            .resetting
            .try_acquire()
            .ok_or(WealthError::Busy("reset"))?;

        let receipt = send_and_confirm(self.ledger.as_ref(), LedgerCall::ResetAll, signer)
            .await
            .map_err(|e| {
                warn!(error = %e, "Reset failed");
                classify(e)
            })?;

        self.bus.publish(UpdateKind::Reset);
        info!(tx = %receipt.hash, block = receipt.block, by = %signer.identity().short(), "All data reset");
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{DecliningSigner, Harness};
    use privwealth_identity::Keypair;

    #[test]
    fn test_confirmation_phrase() {
        assert!(ResetConfirmation::acknowledge("RESET").is_ok());
        assert!(ResetConfirmation::acknowledge(" RESET\n").is_ok());
        assert_eq!(
            ResetConfirmation::acknowledge("reset").unwrap_err(),
            WealthError::ConfirmationRequired
        );
        assert!(ResetConfirmation::acknowledge("").is_err());
    }

    #[tokio::test]
    async fn test_reset_publishes_after_confirmation() {
        let h = Harness::start();
        let c = ResetController::new(h.ledger.clone(), h.bus.clone());
        let a = Keypair::from_seed(&[1u8; 32]);

        let confirm = ResetConfirmation::acknowledge("RESET").unwrap();
        c.reset(&a, confirm).await.unwrap();
        assert_eq!(h.bus.current().seq, 1);
        assert_eq!(h.bus.current().kind, Some(UpdateKind::Reset));
    }

    #[tokio::test]
    async fn test_declined_reset_publishes_nothing() {
        let h = Harness::start();
        let c = ResetController::new(h.ledger.clone(), h.bus.clone());
        let a = DecliningSigner(Keypair::from_seed(&[1u8; 32]));

        let confirm = ResetConfirmation::acknowledge("RESET").unwrap();
        assert_eq!(c.reset(&a, confirm).await, Err(WealthError::SignerRejected));
        assert_eq!(h.bus.current().seq, 0);
    }

    #[tokio::test]
    async fn test_concurrent_reset_is_busy() {
        let h = Harness::start_with(|cfg| cfg.block_time = std::time::Duration::from_millis(300));
        let c = Arc::new(ResetController::new(h.ledger.clone(), h.bus.clone()));
        let a = Arc::new(Keypair::from_seed(&[1u8; 32]));

        let first = {
            let (c, a) = (c.clone(), a.clone());
            tokio::spawn(async move {
                let confirm = ResetConfirmation::acknowledge("RESET").unwrap();
                c.reset(&a, confirm).await
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;

        let confirm = ResetConfirmation::acknowledge("RESET").unwrap();
        assert_eq!(c.reset(&a, confirm).await, Err(WealthError::Busy("reset")));
        assert!(first.await.unwrap().is_ok());
        assert_eq!(h.bus.current().resets, 1);
    }
}

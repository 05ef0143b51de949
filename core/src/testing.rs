//! Fakes shared by the unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use privwealth_gateway::{EncryptionGateway, GatewayClient, GatewayError, LocalConfidentialService};
use privwealth_handle::EncryptedHandle;
use privwealth_identity::{Address, Identity, Keypair, PublicKey, Signature, Signer, SignerError};

use crate::bus::UpdateBus;
use crate::ledger::{LocalLedger, LocalLedgerConfig};

/// Gateway that counts calls and can be slowed down.
pub struct CountingGateway {
    inner: GatewayClient<Arc<LocalConfidentialService>>,
    encrypts: AtomicUsize,
    reveals: AtomicUsize,
    delay_ms: AtomicU64,
}

impl CountingGateway {
    pub fn new(service: Arc<LocalConfidentialService>) -> Self {
        Self {
            inner: GatewayClient::new(service),
            encrypts: AtomicUsize::new(0),
            reveals: AtomicUsize::new(0),
            delay_ms: AtomicU64::new(0),
        }
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn encrypt_calls(&self) -> usize {
        self.encrypts.load(Ordering::SeqCst)
    }

    pub fn reveal_calls(&self) -> usize {
        self.reveals.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        let ms = self.delay_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

impl EncryptionGateway for CountingGateway {
    async fn encrypt(
        &self,
        amount: u128,
        owner: Identity,
        destination: Address,
    ) -> Result<EncryptedHandle, GatewayError> {
        self.encrypts.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.inner.encrypt(amount, owner, destination).await
    }

    async fn reveal<S: Signer>(
        &self,
        handle: &EncryptedHandle,
        signer: &S,
    ) -> Result<u128, GatewayError> {
        self.reveals.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.inner.reveal(handle, signer).await
    }
}

/// A wallet whose holder declines every prompt.
pub struct DecliningSigner(pub Keypair);

impl Signer for DecliningSigner {
    fn identity(&self) -> Identity {
        self.0.identity()
    }

    fn public_key(&self) -> PublicKey {
        self.0.public_key()
    }

    async fn sign(&self, _message: &[u8]) -> Result<Signature, SignerError> {
        Err(SignerError::Rejected)
    }
}

pub struct Harness {
    pub service: Arc<LocalConfidentialService>,
    pub ledger: Arc<LocalLedger>,
    pub gateway: Arc<CountingGateway>,
    pub bus: UpdateBus,
    pub destination: Address,
}

impl Harness {
    pub fn start() -> Self {
        Self::start_with(|_| {})
    }

    pub fn start_with(tweak: impl FnOnce(&mut LocalLedgerConfig)) -> Self {
        let mut config = LocalLedgerConfig {
            block_time: Duration::from_millis(10),
            comparison_delay_blocks: 2,
            receipt_timeout: Duration::from_secs(5),
            ..Default::default()
        };
        tweak(&mut config);

        let destination = config.destination;
        let service = Arc::new(LocalConfidentialService::new(config.chain_id));
        let ledger = Arc::new(LocalLedger::start(config, service.clone()));
        let gateway = Arc::new(CountingGateway::new(service.clone()));

        Self {
            service,
            ledger,
            gateway,
            bus: UpdateBus::new(),
            destination,
        }
    }
}

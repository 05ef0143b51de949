//! One full round: submit, list, reveal, compare.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow, bail};
use privwealth_config::PrivWealthConfig;
use privwealth_core::controllers::{SUBMIT_SUCCESS_MESSAGE, parse_amount};
use privwealth_core::{
    AppSettings, LocalLedger, LocalLedgerConfig, RevealView, WealthApp, WealthError,
};
use privwealth_gateway::{GatewayClient, LocalConfidentialService};
use privwealth_identity::Keypair;
use tracing::info;

/// Funds given to each demo wallet when writes cost something.
const DEMO_FUNDING: u64 = 1_000;

fn ui(err: WealthError) -> anyhow::Error {
    anyhow!("{} ({err})", err.user_message())
}

pub async fn run(config: &PrivWealthConfig, amounts: Vec<String>, tie: bool) -> Result<()> {
    let mut amounts = amounts
        .iter()
        .map(|raw| parse_amount(raw).map_err(ui))
        .collect::<Result<Vec<u128>>>()?;
    if amounts.is_empty() {
        bail!("at least one amount is required");
    }
    if tie {
        if let Some(max) = amounts.iter().copied().max() {
            amounts.push(max);
        }
    }

    let ledger_config = LocalLedgerConfig::from_config(&config.ledger)?;
    let settings = AppSettings::from_config(config)?;
    let comparison_wait = config
        .polling
        .comparison_max_wait()
        .unwrap_or(Duration::from_secs(60));

    let service = Arc::new(LocalConfidentialService::new(ledger_config.chain_id));
    let ledger = Arc::new(LocalLedger::start(ledger_config.clone(), service.clone()));
    let gateway = Arc::new(GatewayClient::new(service));
    let app = WealthApp::new(ledger.clone(), gateway, settings);
    app.start_polling();

    let wallets: Vec<Keypair> = amounts.iter().map(|_| Keypair::generate()).collect();
    if ledger_config.fee_per_write > 0 {
        for wallet in &wallets {
            ledger.fund(wallet.identity(), DEMO_FUNDING).await;
        }
    }

    println!("💰 Submitting {} encrypted amounts", wallets.len());
    for (wallet, amount) in wallets.iter().zip(&amounts) {
        app.connect(Some(wallet.identity())).await;

        let handle = app
            .submission()
            .confirm_amount(&amount.to_string())
            .await
            .map_err(ui)?;
        let shown = if config.features.dev_mode {
            handle.to_hex()
        } else {
            handle.preview()
        };
        println!("  {}  ENCRYPTED DATA {}", wallet.identity().short(), shown);

        let receipt = app.submission().submit(wallet).await.map_err(ui)?;
        println!(
            "  ✅ {} (tx {}, block {})",
            SUBMIT_SUCCESS_MESSAGE,
            receipt.tx_hash,
            receipt.block
        );
    }

    app.participants().refresh().await;
    println!();
    println!("👥 Participants ({})", app.participants().count().await);
    for entry in app.participants().entries().await {
        println!("  {:<16} {}", entry.label(), entry.identity.short());
    }

    println!();
    println!("🔓 Each wallet reveals its own value");
    for wallet in &wallets {
        app.connect(Some(wallet.identity())).await;
        match app.reveal().toggle_reveal(wallet).await.map_err(ui)? {
            RevealView::Revealed { value, .. } => {
                println!("  {}  {}", wallet.identity().short(), value)
            }
            other => println!("  {}  {:?}", wallet.identity().short(), other),
        }
    }

    println!();
    println!("🏆 Triggering comparison");
    let trigger = &wallets[0];
    app.connect(Some(trigger.identity())).await;
    let receipt = app
        .leaderboard()
        .trigger_comparison(trigger)
        .await
        .map_err(ui)?;
    info!(tx = %receipt.hash, block = receipt.block, "Comparison confirmed");

    let started = Instant::now();
    loop {
        app.leaderboard().refresh().await;
        if !app.leaderboard().is_calculating().await || started.elapsed() >= comparison_wait {
            break;
        }
        tokio::time::sleep(ledger_config.block_time).await;
    }
    let standings = app.leaderboard().standings().await;

    println!("  {}", standings.summary());
    if let Some(label) = standings.rank_label() {
        for id in standings.winners() {
            println!("  {:<12} {}", label, id.short());
        }
    }

    app.shutdown().await;
    ledger.shutdown();
    Ok(())
}

mod demo;

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use privwealth_config::PrivWealthConfig;
use privwealth_identity::Keypair;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

#[derive(Parser, Debug)]
#[command(name = "privwealth")]
#[command(about = "Confidential wealth comparison", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a full round against an in-process ledger and confidential service
    Demo {
        /// One generated wallet per amount
        #[arg(long, value_delimiter = ',', default_value = "100,250")]
        amounts: Vec<String>,

        /// Add a wallet that matches the highest amount
        #[arg(long)]
        tie: bool,
    },
    /// Print a sample privwealth.toml
    SampleConfig,
    /// Generate a wallet seed
    Genkey {
        /// Output file (default: ~/.privwealth/id.hex)
        #[arg(long, env = "PW_KEY_FILE")]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "privwealth=info,privwealth_core=info".into()),
        )
        .init();

    let args = Args::parse();

    match args.command {
        Command::Demo { amounts, tie } => {
            let config = PrivWealthConfig::load()?;
            demo::run(&config, amounts, tie).await
        }
        Command::SampleConfig => {
            print!("{}", PrivWealthConfig::generate_sample());
            Ok(())
        }
        Command::Genkey { out } => genkey(out),
    }
}

fn genkey(out: Option<PathBuf>) -> Result<()> {
    let key_path = match out {
        Some(path) => path,
        None => dirs::home_dir()
            .context("Could not determine home directory")?
            .join(".privwealth")
            .join("id.hex"),
    };

    if let Some(dir) = key_path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
            println!("📁 Created directory: {}", dir.display());
        }
    }

    if key_path.exists() {
        bail!(
            "File {} already exists. Remove it first or use a different filename.",
            key_path.display()
        );
    }

    println!("🔐 Generating new keypair...");
    let key = Keypair::generate();

    let mut f = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&key_path)
        .with_context(|| format!("Failed to create {}", key_path.display()))?;

    #[cfg(unix)]
    {
        // rw-------
        let mut perms = f.metadata()?.permissions();
        perms.set_mode(0o600);
        fs::set_permissions(&key_path, perms)?;
    }

    f.write_all(hex::encode(key.seed()).as_bytes())?;

    println!("✅ Wrote new seed to {}", key_path.display());
    println!("🔑 Identity: {}", key.identity());

    Ok(())
}

use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::sync::Arc;
use tokio::sync::broadcast::Receiver;
use tracing_subscriber::EnvFilter;

use padawan_send::{
    amount::format_btc,
    config::{self, Config},
    metrics::{self, Metrics},
    notice::{Notice, NoticeLevel},
    BroadcastOutcome, FlowError, MemoryEngine, PaymentRequest, WalletEngine, WalletSession,
};

#[derive(Parser)]
#[command(author, version, about = "padawan wallet send lifecycle")]
struct Cli {
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Validate, build, confirm and broadcast a payment
    Send {
        #[arg(long)]
        address: String,
        /// Amount in sats
        #[arg(long)]
        amount: String,
        /// Fee rate in sat/vB
        #[arg(long)]
        fee_rate: String,
        /// Broadcast without asking for confirmation
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
    /// Print the engine's confirmed balance without synchronizing
    Balance,
    /// Synchronize with the chain and print the refreshed balance
    Refresh,
}

fn load_config(path: &str) -> anyhow::Result<Config> {
    match config::load(path) {
        Ok(c) => Ok(c),
        Err(e1) => {
            eprintln!("⚠️  Could not read config from '{}': {:#}", path, e1);
            // Embedded default keeps the binary usable without a config file
            const EMBEDDED_CONFIG: &str = include_str!("../config.toml");
            config::load_from_str(EMBEDDED_CONFIG)
                .map_err(|e2| anyhow::anyhow!("failed to load configuration: {} / {}", e1, e2))
        }
    }
}

fn print_notices(rx: &mut Receiver<Notice>) {
    while let Ok(notice) = rx.try_recv() {
        match notice.level {
            NoticeLevel::Info => println!("💬 {}", notice.text),
            NoticeLevel::Error => eprintln!("❌ {}", notice.text),
        }
    }
}

fn ask_confirmation() -> anyhow::Result<bool> {
    print!("   Broadcast this transaction? (y/N): ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    let answer = answer.trim().to_lowercase();
    Ok(answer == "y" || answer == "yes")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.log.level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let metrics = Metrics::new()?;
    if cfg.metrics.enabled {
        metrics::serve(&cfg.metrics, metrics.clone())?;
    }

    let engine = Arc::new(MemoryEngine::new(cfg.engine.starting_balance_sats));
    let session = WalletSession::new(engine, &cfg, metrics);
    let mut notices = session.notices();

    match cli.cmd {
        Cmd::Send { address, amount, fee_rate, yes } => {
            let request = PaymentRequest::new(address, amount, fee_rate);
            let plan = match session.verify(&request).await {
                Ok(plan) => plan,
                Err(FlowError::Validation(_)) | Err(FlowError::Engine(_)) => {
                    // The notice already carries the user-facing message.
                    print_notices(&mut notices);
                    std::process::exit(1);
                }
                Err(e) => return Err(e.into()),
            };

            println!("{}", "=".repeat(60));
            println!("💰 Confirm transaction");
            println!(
                "   Send:      {} sats ({} BTC)",
                plan.sent_amount_sats,
                format_btc(plan.sent_amount_sats)
            );
            println!("   To:        {}", plan.recipient_address);
            println!("   Fee rate:  {} sat/vB", plan.fee_rate_sat_per_vbyte);
            if let Some(fee) = plan.fee_sats {
                println!("   Fee:       {} sats", fee);
            }
            println!("{}", "=".repeat(60));

            let confirmed = if yes {
                true
            } else if atty::is(atty::Stream::Stdin) {
                ask_confirmation()?
            } else {
                eprintln!("⚠️  Non-interactive stdin; pass --yes to broadcast");
                false
            };

            if !confirmed {
                session.cancel()?;
                println!("🚫 Transaction cancelled");
                return Ok(());
            }

            let outcome = session.confirm().await?;
            print_notices(&mut notices);
            session.acknowledge();
            if let BroadcastOutcome::Failure(_) = outcome {
                std::process::exit(1);
            }

            let snapshot = session.refresh().await?;
            println!("💰 Balance: {} BTC", format_btc(snapshot.confirmed_sats));
        }
        Cmd::Balance => {
            let sats = session.engine().balance().await?;
            println!("💰 Balance: {} BTC", format_btc(sats));
        }
        Cmd::Refresh => {
            println!("🔄 Refreshing...");
            let snapshot = session.refresh().await?;
            println!(
                "💰 Balance: {} BTC ({} sats)",
                format_btc(snapshot.confirmed_sats),
                snapshot.confirmed_sats
            );
        }
    }

    Ok(())
}

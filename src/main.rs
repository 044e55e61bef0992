//! resilient-connect command-line tool.
//!
//! # Architecture Overview
//!
//! ```text
//!   target string
//!        │
//!        ▼
//!   ┌──────────┐    ┌───────────┐    ┌──────────────┐
//!   │  target  │───▶│ registry  │───▶│ dns watcher  │──┐
//!   │  parser  │    │ (scheme)  │    │ (one task)   │  │
//!   └──────────┘    └───────────┘    └──────┬───────┘  │
//!                                           │          │ address sets
//!                                    ┌──────▼───────┐  │
//!                                    │ address cache│  │
//!                                    │ + janitor    │  │
//!                                    └──────────────┘  ▼
//!                                              ┌────────────────┐
//!   call(op) ─▶ retry ─▶ breaker ─▶ timeout ─▶ │ClientConnection│
//!                                              └────────────────┘
//! ```
//!
//! # Commands
//! - `resolve <target> [--watch]`: print published address sets as JSON
//! - `backoff --base-ms --max-ms --count`: print a backoff delay sequence

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use resilient_connect::config::{load_config, ConnectorConfig};
use resilient_connect::lifecycle::{wait_for_signal, Shutdown};
use resilient_connect::observability::{init_logging, init_metrics};
use resilient_connect::resilience::ExponentialBackoff;
use resilient_connect::{Address, ConnectionFactory};

#[derive(Parser)]
#[command(name = "resilient-connect", version, about = "Resolve targets and inspect connection policies")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a target and print its addresses
    Resolve {
        /// Target, e.g. `dns:///svc.internal:443` or `10.0.0.1:80`
        target: String,

        /// Keep watching and print every update until interrupted
        #[arg(short, long)]
        watch: bool,

        /// Seconds between re-resolutions in watch mode
        #[arg(long, default_value_t = 30)]
        interval_secs: u64,
    },
    /// Print the delays of an exponential backoff sequence
    Backoff {
        #[arg(long, default_value_t = 200)]
        base_ms: u64,

        #[arg(long, default_value_t = 30_000)]
        max_ms: u64,

        #[arg(long, default_value_t = 10)]
        count: usize,
    },
}

#[derive(serde::Serialize)]
struct Update<'a> {
    target: &'a str,
    addresses: &'a [Address],
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ConnectorConfig::default(),
    };

    init_logging(&config.observability)?;
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "resilient-connect starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    match cli.command {
        Commands::Resolve { target, watch, interval_secs } => {
            resolve(config, &target, watch, Duration::from_secs(interval_secs)).await
        }
        Commands::Backoff { base_ms, max_ms, count } => {
            let backoff = ExponentialBackoff::new(Duration::from_millis(base_ms), Duration::from_millis(max_ms))?;
            let delays: Vec<u128> = (0..count).map(|_| backoff.next_delay().as_millis()).collect();
            println!("{}", serde_json::to_string(&delays)?);
            Ok(())
        }
    }
}

async fn resolve(
    config: ConnectorConfig,
    target: &str,
    watch: bool,
    interval: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let lookup_timeout = config.resolver.lookup_timeout();
    let factory = ConnectionFactory::new(config)?;
    let conn = factory.connect(target)?;

    let first = match tokio::time::timeout(lookup_timeout * 2, conn.wait_for_update()).await {
        Ok(addresses) => addresses,
        Err(_) => conn.addresses(),
    };
    println!("{}", serde_json::to_string(&Update { target, addresses: &first })?);

    if watch {
        let shutdown = Shutdown::new();
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            wait_for_signal().await;
            trigger.trigger();
        });

        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                _ = ticker.tick() => conn.resolve_now(),
                addresses = conn.wait_for_update() => {
                    println!("{}", serde_json::to_string(&Update { target, addresses: &addresses })?);
                }
            }
        }
    }

    conn.close().await;
    factory.shutdown().await;
    Ok(())
}

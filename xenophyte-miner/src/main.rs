use std::path::PathBuf;

use clap::Parser;

use xenophyte_miner::config::MinerConfig;
use xenophyte_miner::daemon::Daemon;
use xenophyte_miner::tracing::{self, prelude::*};

/// Solo CPU miner for the Xenophyte network.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// JSON configuration file.
    #[arg(short, long, env = "XENOPHYTE_CONFIG")]
    config: Option<PathBuf>,

    /// Seed node, `host[:port]`.
    #[arg(long)]
    url: Option<String>,

    /// Wallet address to mine to.
    #[arg(long)]
    wallet: Option<String>,

    /// Number of mining threads.
    #[arg(short, long)]
    threads: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tracing::init_journald_or_stdout();

    let mut config = MinerConfig::load(args.config.as_deref())?;
    config.apply_env();
    if let Some(url) = args.url {
        config.pool.url = url;
    }
    if let Some(wallet) = args.wallet {
        config.pool.wallet = wallet;
    }
    if let Some(threads) = args.threads {
        config.cpu_miner.threads = threads;
    }
    config.validate()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pool = %config.pool.url,
        threads = config.cpu_miner.thread_count(),
        "xenophyte-miner"
    );

    Daemon::new(config).run().await
}

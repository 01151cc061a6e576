//! # SKVS Server
//!
//! Start the worker pool on the configured address and run until Ctrl-C,
//! then stop the workers and print the table contents.
//!
//! ## Design Principles
//!
//! 1. **Threads Serve, Runtime Waits**: Workers are plain OS threads; the
//!    async runtime only waits for the interrupt signal.
//! 2. **Layered Configuration**: Defaults, then `SKVS_*` variables, then flags.
//! 3. **Quiescent Dump**: The table is dumped only after every worker joined.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use skvs_engine::ShardedTable;
use skvs_server::{Server, ServerConfig};

/// Concurrent in-memory key-value server speaking a line protocol.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Listen address (host:port)
    #[arg(short, long)]
    addr: Option<String>,

    /// Number of worker threads
    #[arg(short, long)]
    workers: Option<usize>,

    /// Number of hash table buckets
    #[arg(short, long)]
    buckets: Option<usize>,

    /// Delay applied on every lock release, in milliseconds
    #[arg(long, value_name = "MS")]
    lock_delay_ms: Option<u64>,

    /// Do not print the table contents on shutdown
    #[arg(long)]
    no_dump: bool,
}

impl Cli {
    fn apply(self, mut config: ServerConfig) -> ServerConfig {
        if let Some(addr) = self.addr {
            config.addr = addr;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(buckets) = self.buckets {
            config.buckets = buckets;
        }
        if let Some(ms) = self.lock_delay_ms {
            config.lock_delay = Duration::from_millis(ms);
        }
        if self.no_dump {
            config.dump_on_shutdown = false;
        }
        config
    }
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing();

    let config = Cli::parse().apply(ServerConfig::from_env()?);
    config.validate()?;
    info!(?config, "starting");

    let table = Arc::new(ShardedTable::new(config.buckets, config.lock_options())?);
    let server = Server::bind(&config, table)
        .with_context(|| format!("failed to start server on {}", config.addr))?;
    let handle = server.start()?;
    info!(addr = %handle.local_addr(), "listening");

    let shutdown = handle.shutdown_handle();
    let workers = tokio::task::spawn_blocking(move || handle.join());

    let signal = tokio::signal::ctrl_c().await;
    info!("stopping workers");
    shutdown.trigger();
    let table = workers.await??;
    signal.context("failed to listen for ctrl-c")?;

    if config.dump_on_shutdown {
        match Arc::try_unwrap(table) {
            Ok(mut table) => println!("{}", table.dump()),
            Err(_) => warn!("table still shared after shutdown; skipping dump"),
        }
    }
    Ok(())
}

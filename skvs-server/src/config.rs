use std::time::Duration;

use skvs_common::{DEFAULT_BACKLOG, DEFAULT_BUCKETS, DEFAULT_LISTEN_ADDR, DEFAULT_WORKERS};
use skvs_engine::LockOptions;

use crate::error::{ServerError, ServerResult};

/// Environment variable overriding the listen address.
pub const ENV_ADDR: &str = "SKVS_ADDR";
/// Environment variable overriding the worker count.
pub const ENV_WORKERS: &str = "SKVS_WORKERS";
/// Environment variable overriding the bucket count.
pub const ENV_BUCKETS: &str = "SKVS_BUCKETS";
/// Environment variable overriding the lock release delay, in milliseconds.
pub const ENV_LOCK_DELAY_MS: &str = "SKVS_LOCK_DELAY_MS";

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Listen address, resolved at bind time
    pub addr: String,
    /// Number of worker threads
    pub workers: usize,
    /// Number of hash table buckets
    pub buckets: usize,
    /// Delay injected on every lock release, for race testing
    pub lock_delay: Duration,
    /// Listen backlog
    pub backlog: u32,
    /// Print the table contents after the workers have stopped
    pub dump_on_shutdown: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_LISTEN_ADDR.to_string(),
            workers: DEFAULT_WORKERS,
            buckets: DEFAULT_BUCKETS,
            lock_delay: Duration::ZERO,
            backlog: DEFAULT_BACKLOG,
            dump_on_shutdown: true,
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `SKVS_*` environment variables.
    pub fn from_env() -> ServerResult<Self> {
        Self::default().with_overrides(|name| std::env::var(name).ok())
    }

    /// Applies overrides from `lookup`, which maps a variable name to its
    /// value.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> ServerResult<Self> {
        if let Some(addr) = lookup(ENV_ADDR) {
            self.addr = addr;
        }
        if let Some(workers) = lookup(ENV_WORKERS) {
            self.workers = parse_number(ENV_WORKERS, &workers)?;
        }
        if let Some(buckets) = lookup(ENV_BUCKETS) {
            self.buckets = parse_number(ENV_BUCKETS, &buckets)?;
        }
        if let Some(delay) = lookup(ENV_LOCK_DELAY_MS) {
            self.lock_delay = Duration::from_millis(parse_number(ENV_LOCK_DELAY_MS, &delay)?);
        }
        Ok(self)
    }

    /// Rejects values the server cannot run with.
    pub fn validate(&self) -> ServerResult<()> {
        if self.workers == 0 {
            return Err(ServerError::InvalidConfig("workers must be at least 1".into()));
        }
        if self.buckets == 0 {
            return Err(ServerError::InvalidConfig("buckets must be at least 1".into()));
        }
        if self.backlog == 0 {
            return Err(ServerError::InvalidConfig("backlog must be at least 1".into()));
        }
        Ok(())
    }

    /// Lock parameters for the table: one writer ticket per worker.
    pub fn lock_options(&self) -> LockOptions {
        LockOptions {
            ring_capacity: self.workers,
            release_delay: self.lock_delay,
        }
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, raw: &str) -> ServerResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| ServerError::InvalidConfig(format!("{name}: '{raw}' is not a valid number")))
}

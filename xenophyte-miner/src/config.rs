//! Miner configuration.
//!
//! Sources, lowest precedence first: built-in defaults, an optional JSON
//! file, `XENOPHYTE_*` environment variables, then command-line flags
//! (applied by `main`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::cpu_miner::CpuMinerConfig;
use crate::crypto::ShareDigest;
use crate::network::{Endpoint, NetworkSettings};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("invalid pool url: {0}")]
    InvalidUrl(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Node connection and identity.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// `host[:port]`, optionally with a scheme. Port defaults to 18000.
    pub url: String,
    pub wallet: String,
    pub user_agent: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            wallet: String::new(),
            user_agent: concat!("xenophyte-miner/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MinerConfig {
    pub pool: PoolConfig,

    /// Per-request network timeout, in seconds.
    pub network_timeout: u64,

    /// Interval between hashrate prints, in seconds.
    pub print_speed_duration: u64,

    /// Consecutive failed connection attempts before giving up.
    pub max_retry_count: u32,

    pub share_digest: ShareDigest,

    pub cpu_miner: CpuMinerConfig,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            network_timeout: 5,
            print_speed_duration: 10,
            max_retry_count: 5,
            share_digest: ShareDigest::default(),
            cpu_miner: CpuMinerConfig::default(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

impl MinerConfig {
    /// Defaults, overlaid with `path` if given.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply environment overrides.
    ///
    /// - `XENOPHYTE_POOL_URL`
    /// - `XENOPHYTE_WALLET`
    /// - `XENOPHYTE_USER_AGENT`
    /// - `XENOPHYTE_THREADS`
    /// - `XENOPHYTE_NETWORK_TIMEOUT` (seconds)
    /// - `XENOPHYTE_PRINT_SPEED_DURATION` (seconds)
    ///
    /// Unparseable numbers are ignored.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("XENOPHYTE_POOL_URL") {
            self.pool.url = url;
        }
        if let Ok(wallet) = std::env::var("XENOPHYTE_WALLET") {
            self.pool.wallet = wallet;
        }
        if let Ok(user_agent) = std::env::var("XENOPHYTE_USER_AGENT") {
            self.pool.user_agent = user_agent;
        }
        if let Some(timeout) = env_parse("XENOPHYTE_NETWORK_TIMEOUT") {
            self.network_timeout = timeout;
        }
        if let Some(duration) = env_parse("XENOPHYTE_PRINT_SPEED_DURATION") {
            self.print_speed_duration = duration;
        }
        self.cpu_miner.apply_env();
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.pool.url.trim().is_empty() {
            return Err(ConfigError::Missing("pool.url"));
        }
        if self.pool.wallet.trim().is_empty() {
            return Err(ConfigError::Missing("pool.wallet"));
        }
        if self.cpu_miner.thread_count() == 0 {
            return Err(ConfigError::Zero("cpu_miner.threads"));
        }
        if self.network_timeout == 0 {
            return Err(ConfigError::Zero("network_timeout"));
        }
        if self.print_speed_duration == 0 {
            return Err(ConfigError::Zero("print_speed_duration"));
        }
        self.endpoint()?;
        Ok(())
    }

    pub fn endpoint(&self) -> ConfigResult<Endpoint> {
        Endpoint::parse(&self.pool.url).map_err(|_| ConfigError::InvalidUrl(self.pool.url.clone()))
    }

    pub fn network_settings(&self) -> ConfigResult<NetworkSettings> {
        Ok(NetworkSettings {
            endpoint: self.endpoint()?,
            wallet: self.pool.wallet.clone(),
            user_agent: self.pool.user_agent.clone(),
            timeout: Duration::from_secs(self.network_timeout),
        })
    }

    pub fn print_speed_interval(&self) -> Duration {
        Duration::from_secs(self.print_speed_duration)
    }
}

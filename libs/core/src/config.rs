//! Configuration for funnel invocations.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use directories::BaseDirs;

/// Ledger file name inside the local data directory.
pub const LEDGER_FILE: &str = "qfunnel.db";

/// Funnel configuration.
#[derive(Debug, Clone)]
pub struct FunnelConfig {
    /// Path of the SQLite ledger.
    pub db_path: PathBuf,

    /// How long to wait for the ledger lock before giving up.
    ///
    /// Checks hold the lock while talking to the scheduler, so this is
    /// generous.
    pub lock_timeout: Duration,

    /// Default pause between watch cycles.
    pub watch_interval: Duration,
}

impl FunnelConfig {
    /// A configuration with default timings for the ledger at `db_path`.
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            lock_timeout: Duration::from_secs(60),
            watch_interval: Duration::from_secs(300),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let db_path = match std::env::var_os("QFUNNEL_DB") {
            Some(path) => PathBuf::from(path),
            None => BaseDirs::new()
                .map(|dirs| dirs.data_local_dir().join(LEDGER_FILE))
                .context("Could not determine the local data directory; set QFUNNEL_DB")?,
        };

        let mut config = Self::new(db_path);

        if let Some(secs) = env_secs("QFUNNEL_LOCK_TIMEOUT")? {
            config.lock_timeout = secs;
        }
        if let Some(secs) = env_secs("QFUNNEL_WATCH_INTERVAL")? {
            config.watch_interval = secs;
        }

        Ok(config)
    }
}

fn env_secs(name: &str) -> Result<Option<Duration>> {
    match std::env::var(name) {
        Ok(raw) => {
            let secs: f64 = raw
                .trim()
                .parse()
                .with_context(|| format!("{name} must be a number of seconds, got {raw:?}"))?;
            Duration::try_from_secs_f64(secs)
                .map(Some)
                .with_context(|| format!("{name} must be a non-negative number of seconds"))
        }
        Err(_) => Ok(None),
    }
}

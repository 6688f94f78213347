//! Daemon settings, from flags or the environment.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use crate::mirror::{DEFAULT_REMOTE, MirrorPaths};

#[derive(Debug, Clone, Args)]
pub struct Config {
    /// Directory holding the mirror [default: <data dir>/metamirror]
    #[arg(long, env = "METAMIRROR_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Git URL of the metadata repository
    #[arg(long, env = "METAMIRROR_REMOTE", default_value = DEFAULT_REMOTE, global = true)]
    pub remote: String,

    /// Seconds between background refreshes
    #[arg(
        long,
        env = "METAMIRROR_REFRESH_INTERVAL_SECS",
        default_value_t = 240,
        global = true
    )]
    pub refresh_interval_secs: u64,

    /// Poll requests are refused if the last refresh is younger than this
    #[arg(
        long,
        env = "METAMIRROR_POLL_COOLDOWN_SECS",
        default_value_t = 120,
        global = true
    )]
    pub poll_cooldown_secs: u64,

    /// How long a refresh waits for another process holding the mirror lock
    #[arg(
        long,
        env = "METAMIRROR_LOCK_TIMEOUT_SECS",
        default_value_t = 300,
        global = true
    )]
    pub lock_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            remote: DEFAULT_REMOTE.to_string(),
            refresh_interval_secs: 240,
            poll_cooldown_secs: 120,
            lock_timeout_secs: 300,
        }
    }
}

impl Config {
    pub fn paths(&self) -> MirrorPaths {
        match &self.data_dir {
            Some(dir) => MirrorPaths::new(dir),
            None => MirrorPaths::default(),
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        // A zero interval would make the ticker spin.
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }

    pub fn poll_cooldown(&self) -> Duration {
        Duration::from_secs(self.poll_cooldown_secs)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }
}

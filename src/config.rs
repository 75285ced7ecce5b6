//! Runtime configuration, resolved once at startup from flags and the
//! environment. A flag wins over its variable.
//!
//! | flag            | variable                  | default   |
//! |-----------------|---------------------------|-----------|
//! | `--worker`      | `GDOCS_SYNC_WORKER`       | (lookup)  |
//! | `--python`      | `GDOCS_SYNC_PYTHON`       | `python3` |
//! | `--interval-ms` | `GDOCS_SYNC_INTERVAL_MS`  | `30000`   |
//! | `--timeout-ms`  | `GDOCS_SYNC_TIMEOUT_MS`   | `10000`   |
//! | `--list-limit`  | `GDOCS_SYNC_LIST_LIMIT`   | `50`      |

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use crate::ipc::{WorkerLocator, DEFAULT_TIMEOUT_MS};

pub const ENV_WORKER: &str = "GDOCS_SYNC_WORKER";
pub const ENV_PYTHON: &str = "GDOCS_SYNC_PYTHON";
pub const ENV_INTERVAL_MS: &str = "GDOCS_SYNC_INTERVAL_MS";
pub const ENV_TIMEOUT_MS: &str = "GDOCS_SYNC_TIMEOUT_MS";
pub const ENV_LIST_LIMIT: &str = "GDOCS_SYNC_LIST_LIMIT";

const DEFAULT_PYTHON: &str = "python3";
const DEFAULT_INTERVAL_MS: u64 = 30_000;
const DEFAULT_LIST_LIMIT: usize = 50;

/// Settings shared by every subcommand.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct ConfigArgs {
    /// Worker script, bypassing the lookup
    #[arg(long, global = true, value_name = "PATH", env = ENV_WORKER)]
    pub worker: Option<PathBuf>,

    /// Interpreter for `.py` worker scripts
    #[arg(long, global = true, value_name = "PROGRAM", env = ENV_PYTHON, default_value = DEFAULT_PYTHON)]
    pub python: String,

    /// Auto-sync period in milliseconds, 0 disables it
    #[arg(long, global = true, value_name = "MS", env = ENV_INTERVAL_MS, default_value_t = DEFAULT_INTERVAL_MS)]
    pub interval_ms: u64,

    /// Timeout for blocking requests in milliseconds
    #[arg(long, global = true, value_name = "MS", env = ENV_TIMEOUT_MS, default_value_t = DEFAULT_TIMEOUT_MS)]
    pub timeout_ms: u64,

    /// Documents fetched by a listing
    #[arg(long, global = true, value_name = "N", env = ENV_LIST_LIMIT, default_value_t = DEFAULT_LIST_LIMIT)]
    pub list_limit: usize,
}

impl From<ConfigArgs> for Config {
    fn from(args: ConfigArgs) -> Self {
        Self {
            worker_path: args.worker,
            python: args.python,
            sync_interval: Duration::from_millis(args.interval_ms),
            request_timeout: Duration::from_millis(args.timeout_ms),
            list_limit: args.list_limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Explicit worker script, bypassing the lookup.
    pub worker_path: Option<PathBuf>,
    /// Interpreter for `.py` worker scripts.
    pub python: String,
    /// Auto-sync period; zero disables auto-sync.
    pub sync_interval: Duration,
    /// Timeout for blocking requests.
    pub request_timeout: Duration,
    /// `max_results` for document listings.
    pub list_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            worker_path: None,
            python: DEFAULT_PYTHON.to_string(),
            sync_interval: Duration::from_millis(DEFAULT_INTERVAL_MS),
            request_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            list_limit: DEFAULT_LIST_LIMIT,
        }
    }
}

impl Config {
    /// Worker lookup for this configuration.
    pub fn locator(&self) -> WorkerLocator {
        WorkerLocator::new(self.worker_path.clone(), self.python.clone())
    }

    /// Directory for the TUI's log file.
    pub fn log_dir() -> Option<PathBuf> {
        dirs::cache_dir().map(|d| d.join("gdocs-sync"))
    }
}

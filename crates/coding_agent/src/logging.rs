//! File-backed tracing setup. The console belongs to the conversation, so log
//! output never goes to stdout or stderr.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::config::ConfigError;

pub const LOG_ENV_VAR: &str = "CODING_AGENT_LOG";
pub const LOG_FILE_NAME: &str = "coding_agent.log";
const DEFAULT_LOG_FILTER: &str = "info";

/// Picks the filter directive: `CODING_AGENT_LOG`, then `RUST_LOG`, then the
/// configured value, then `info`.
pub fn resolve_filter(
    configured: Option<&str>,
    lookup: impl Fn(&str) -> Option<String>,
) -> String {
    lookup(LOG_ENV_VAR)
        .or_else(|| lookup("RUST_LOG"))
        .or_else(|| configured.map(str::to_string))
        .map(|value| match value.trim() {
            "silent" => "off".to_string(),
            other => other.to_string(),
        })
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string())
}

fn env_filter(directive: &str) -> EnvFilter {
    EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("warn"))
}

/// Log file placed beside the history directory.
#[must_use]
pub fn default_log_path(history_dir: &Path) -> PathBuf {
    history_dir
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .join(LOG_FILE_NAME)
}

/// Installs the global subscriber writing to `log_path` in append mode.
pub fn init_file_logging(log_path: &Path, directive: &str) -> Result<(), ConfigError> {
    if let Some(parent) = log_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|source| ConfigError::io("creating log directory", parent, source))?;
        }
    }

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .map_err(|source| ConfigError::io("opening log file", log_path, source))?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter(directive))
        .with_ansi(false)
        .with_writer(Mutex::new(log_file))
        .try_init()
        .map_err(|error| ConfigError::Logging(error.to_string()))
}

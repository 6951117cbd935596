//! Startup configuration.
//!
//! Settings come from an optional JSON file (`--config <path>` or
//! `CODING_AGENT_CONFIG`) plus a few environment overrides. String values that
//! start with `$` are replaced by the named environment variable when it is set.
//!
//! ```json
//! {
//!   "history_dir": "$HOME/.coding_agent/history",
//!   "log_file": "/tmp/coding_agent.log",
//!   "log_filter": "coding_agent=debug,info",
//!   "recursion_limit": 200,
//!   "shell": {
//!     "program": "/bin/bash",
//!     "args": ["--norc", "--noprofile", "--noediting", "-i"],
//!     "ready_timeout_ms": 5000,
//!     "command_timeout_sec": 60
//!   }
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use shell_session::ShellConfig;
use thiserror::Error;

use crate::controller::DEFAULT_RECURSION_LIMIT;
use crate::runtimes::{DEFAULT_RUNTIME_ID, RUNTIME_ENV_VAR};

pub const CONFIG_ENV_VAR: &str = "CODING_AGENT_CONFIG";
pub const HISTORY_DIR_ENV_VAR: &str = "CODING_AGENT_HISTORY_DIR";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error while {operation} at {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value for '{field}': {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },

    #[error("failed to install log subscriber: {0}")]
    Logging(String),
}

impl ConfigError {
    #[must_use]
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            message: message.into(),
        }
    }
}

/// Raw contents of the JSON config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub history_dir: Option<String>,
    pub log_file: Option<String>,
    pub log_filter: Option<String>,
    pub recursion_limit: Option<u32>,
    pub shell: ShellFileConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShellFileConfig {
    pub program: Option<String>,
    pub args: Option<Vec<String>>,
    pub ready_timeout_ms: Option<u64>,
    pub command_timeout_sec: Option<u64>,
}

/// Resolved settings used by the binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// `None` selects the store's default location.
    pub history_dir: Option<PathBuf>,
    /// `None` places the log next to the history directory.
    pub log_file: Option<PathBuf>,
    pub log_filter: Option<String>,
    pub runtime_id: String,
    pub recursion_limit: u32,
    pub shell: ShellConfig,
    pub command_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            history_dir: None,
            log_file: None,
            log_filter: None,
            runtime_id: DEFAULT_RUNTIME_ID.to_string(),
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            shell: ShellConfig::default(),
            command_timeout: shell_session::DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

impl AppConfig {
    /// Reads the config file named by `explicit_path` or `CODING_AGENT_CONFIG`
    /// and applies environment overrides.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
        let env_path = std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from);
        let file = match explicit_path.map(Path::to_path_buf).or(env_path) {
            Some(path) => read_file_config(&path)?,
            None => FileConfig::default(),
        };

        Self::resolve(file, |name| std::env::var(name).ok())
    }

    /// Builds the final settings from `file`, reading variables through `lookup`.
    pub fn resolve(
        file: FileConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let expand = |value: String| expand_env(&value, &lookup);

        let history_dir = lookup(HISTORY_DIR_ENV_VAR)
            .filter(|value| !value.trim().is_empty())
            .or_else(|| file.history_dir.map(expand))
            .map(PathBuf::from);
        let runtime_id = lookup(RUNTIME_ENV_VAR)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or(defaults.runtime_id);

        let recursion_limit = file.recursion_limit.unwrap_or(defaults.recursion_limit);
        if recursion_limit == 0 {
            return Err(ConfigError::invalid(
                "recursion_limit",
                "must be greater than zero",
            ));
        }

        let mut shell = defaults.shell;
        if let Some(program) = file.shell.program.map(expand) {
            if program.trim().is_empty() {
                return Err(ConfigError::invalid("shell.program", "must not be empty"));
            }
            shell.program = program;
        }
        if let Some(args) = file.shell.args {
            shell.args = args.into_iter().map(expand).collect();
        }
        if let Some(ready_timeout_ms) = file.shell.ready_timeout_ms {
            if ready_timeout_ms == 0 {
                return Err(ConfigError::invalid(
                    "shell.ready_timeout_ms",
                    "must be greater than zero",
                ));
            }
            shell.ready_timeout = Duration::from_millis(ready_timeout_ms);
        }

        let command_timeout = match file.shell.command_timeout_sec {
            Some(0) => {
                return Err(ConfigError::invalid(
                    "shell.command_timeout_sec",
                    "must be greater than zero",
                ));
            }
            Some(seconds) => Duration::from_secs(seconds),
            None => defaults.command_timeout,
        };

        Ok(Self {
            history_dir,
            log_file: file.log_file.map(expand).map(PathBuf::from),
            log_filter: file.log_filter.map(expand),
            runtime_id,
            recursion_limit,
            shell,
            command_timeout,
        })
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::io("reading config file", path, source))?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Replaces a value of the form `$NAME` with the variable `NAME`, if set.
fn expand_env(value: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    value
        .strip_prefix('$')
        .filter(|name| !name.is_empty())
        .and_then(|name| lookup(name))
        .unwrap_or_else(|| value.to_string())
}

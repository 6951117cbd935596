use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Fatal failure while bringing a shell session up.
///
/// Failures of individual commands are never reported through this type; they
/// are returned as `Error: ...` text by [`crate::ShellSession::execute`].
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("pseudo-terminal failure while {operation}: {message}")]
    Pty {
        operation: &'static str,
        message: String,
    },

    #[error("I/O error while {operation}: {source}")]
    Io {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("shell prompt did not appear within {timeout:?}; output so far: {output:?}")]
    NotReady { timeout: Duration, output: String },

    #[error("shell exited during startup; output so far: {output:?}")]
    ExitedDuringStartup { output: String },

    #[error("failed to enter initial directory {path}: {output}")]
    InitialDirectory { path: PathBuf, output: String },
}

impl ShellError {
    #[must_use]
    pub fn pty(operation: &'static str, error: impl std::fmt::Display) -> Self {
        Self::Pty {
            operation,
            message: error.to_string(),
        }
    }

    #[must_use]
    pub fn io(operation: &'static str, source: std::io::Error) -> Self {
        Self::Io { operation, source }
    }
}

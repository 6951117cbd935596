use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("I/O error while {operation} at {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid session id '{id}': must be a non-empty file name without path separators")]
    InvalidSessionId { id: String },

    #[error("Session {id} not found")]
    NotFound { id: String },

    #[error("session record {path} is not valid: {source}")]
    InvalidRecord {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize session record for {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to format current UTC timestamp: {0}")]
    ClockFormat(#[source] time::error::Format),
}

impl SessionStoreError {
    #[must_use]
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub fn invalid_record(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::InvalidRecord {
            path: path.into(),
            source,
        }
    }

    /// True for errors a caller should present as "session not found".
    ///
    /// A record that exists but cannot be parsed counts as missing.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::InvalidRecord { .. })
    }
}

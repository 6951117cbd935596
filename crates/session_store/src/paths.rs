use std::path::{Path, PathBuf};

pub const HISTORY_DIR: [&str; 2] = [".coding_agent", "history"];
pub const FALLBACK_HISTORY_DIR: &str = ".history";
pub const SESSION_FILE_EXTENSION: &str = "json";

/// `~/.coding_agent/history`, or `None` when no home directory is known.
#[must_use]
pub fn default_history_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(HISTORY_DIR[0]).join(HISTORY_DIR[1]))
}

#[must_use]
pub fn session_file_name(session_id: &str) -> String {
    format!("{session_id}.{SESSION_FILE_EXTENSION}")
}

#[must_use]
pub fn session_path(root: &Path, session_id: &str) -> PathBuf {
    root.join(session_file_name(session_id))
}

/// Accepts ids that can be used verbatim as a file stem.
#[must_use]
pub fn is_valid_session_id(session_id: &str) -> bool {
    !session_id.is_empty()
        && session_id != "."
        && session_id != ".."
        && !session_id.contains(['/', '\\', '\0'])
}

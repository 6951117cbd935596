use std::cmp::Reverse;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use agent_runtime::Message;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::error::SessionStoreError;
use crate::paths::{
    default_history_dir, is_valid_session_id, session_path, FALLBACK_HISTORY_DIR,
    SESSION_FILE_EXTENSION,
};
use crate::schema::SessionRecord;

/// Listing entry for one saved conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub id: String,
    pub path: PathBuf,
    pub timestamp: String,
    pub modified: SystemTime,
    pub preview: String,
}

/// Directory of JSON session records, one file per session id.
///
/// Holds no state besides the directory; every call reads or writes the files
/// directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, SessionStoreError> {
        let root = root.into();
        fs::create_dir_all(&root)
            .map_err(|source| SessionStoreError::io("creating history directory", &root, source))?;
        Ok(Self { root })
    }

    /// Opens `~/.coding_agent/history`, falling back to `./.history` when the
    /// home directory is unknown or cannot be written.
    pub fn open_default() -> Result<Self, SessionStoreError> {
        if let Some(dir) = default_history_dir() {
            match Self::new(&dir) {
                Ok(store) => return Ok(store),
                Err(error) => {
                    warn!(%error, "falling back to local history directory");
                }
            }
        }

        Self::new(FALLBACK_HISTORY_DIR)
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes `messages` as the record for `session_id`, replacing any previous
    /// record with that id. Without an id, one is derived from the current UTC
    /// time (`YYYYMMDD_HHMMSS`). Returns the id used.
    pub fn save(
        &self,
        messages: &[Message],
        session_id: Option<&str>,
        project_root: Option<&Path>,
    ) -> Result<String, SessionStoreError> {
        let now = OffsetDateTime::now_utc();
        let session_id = match session_id {
            Some(id) if !is_valid_session_id(id) => {
                return Err(SessionStoreError::InvalidSessionId { id: id.to_string() });
            }
            Some(id) => id.to_string(),
            None => session_id_for(now),
        };

        let timestamp = now.format(&Rfc3339).map_err(SessionStoreError::ClockFormat)?;
        let record = SessionRecord {
            session_id: session_id.clone(),
            timestamp,
            project_root: project_root.map(|root| root.display().to_string()),
            messages: messages.to_vec(),
        };

        let path = session_path(&self.root, &session_id);
        let encoded = serde_json::to_string_pretty(&record).map_err(|source| {
            SessionStoreError::Serialize {
                path: path.clone(),
                source,
            }
        })?;
        fs::write(&path, encoded)
            .map_err(|source| SessionStoreError::io("writing session record", &path, source))?;

        info!(
            session_id = %session_id,
            messages = messages.len(),
            path = %path.display(),
            "saved session"
        );
        Ok(session_id)
    }

    /// Lists saved sessions, most recently modified first.
    ///
    /// With `project_root`, only records tagged with that directory are kept.
    /// Unreadable or malformed records are skipped.
    pub fn list(
        &self,
        project_root: Option<&Path>,
    ) -> Result<Vec<SessionSummary>, SessionStoreError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(source) if source.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(SessionStoreError::io(
                    "listing history directory",
                    &self.root,
                    source,
                ));
            }
        };

        let target_root = project_root.map(resolve);
        let mut sessions = Vec::new();

        for entry in entries {
            let Ok(entry) = entry else {
                continue;
            };
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(SESSION_FILE_EXTENSION) {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };

            let record = match read_record(&path) {
                Ok(record) => record,
                Err(error) => {
                    debug!(%error, "skipping unreadable session record");
                    continue;
                }
            };

            if let Some(target_root) = &target_root {
                let Some(record_root) = record.project_root.as_deref() else {
                    continue;
                };
                if &resolve(Path::new(record_root)) != target_root {
                    continue;
                }
            }

            let modified = entry
                .metadata()
                .and_then(|metadata| metadata.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);

            sessions.push(SessionSummary {
                id: id.to_string(),
                preview: record.preview(),
                timestamp: record.timestamp,
                modified,
                path,
            });
        }

        sessions.sort_by_key(|session| {
            Reverse((session.modified, session.timestamp.clone(), session.id.clone()))
        });
        Ok(sessions)
    }

    /// Loads the messages saved under `session_id`.
    ///
    /// The id is tried as a key in this store first and then as a path to a
    /// record file.
    pub fn load(&self, session_id: &str) -> Result<Vec<Message>, SessionStoreError> {
        self.load_record(session_id).map(|record| record.messages)
    }

    pub fn load_record(&self, session_id: &str) -> Result<SessionRecord, SessionStoreError> {
        let keyed = is_valid_session_id(session_id)
            .then(|| session_path(&self.root, session_id))
            .filter(|path| path.is_file());
        let path = match keyed {
            Some(path) => path,
            None => {
                let direct = PathBuf::from(session_id);
                if session_id.is_empty() || !direct.is_file() {
                    return Err(SessionStoreError::NotFound {
                        id: session_id.to_string(),
                    });
                }
                direct
            }
        };

        let record = read_record(&path)?;
        info!(
            session_id,
            messages = record.messages.len(),
            path = %path.display(),
            "loaded session"
        );
        Ok(record)
    }
}

fn read_record(path: &Path) -> Result<SessionRecord, SessionStoreError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| SessionStoreError::io("reading session record", path, source))?;
    serde_json::from_str(&raw).map_err(|source| SessionStoreError::invalid_record(path, source))
}

fn resolve(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

fn session_id_for(now: OffsetDateTime) -> String {
    format!(
        "{:04}{:02}{:02}_{:02}{:02}{:02}",
        now.year(),
        u8::from(now.month()),
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    )
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn generated_ids_have_second_granularity() {
        let now = datetime!(2026-02-14 09:05:03 UTC);

        assert_eq!(session_id_for(now), "20260214_090503");
    }
}

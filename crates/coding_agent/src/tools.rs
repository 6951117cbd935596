use std::fs;
use std::path::{Path, PathBuf};

use agent_runtime::ToolOutput;
use tracing::debug;

const DEFAULT_READ_MAX_BYTES: usize = 200 * 1024;

/// File tools confined to the project root.
///
/// A path is accepted only when its canonical form stays under the root. For
/// writes the closest existing ancestor is checked before anything is created,
/// and the created parent is checked again afterwards.
#[derive(Debug, Clone)]
pub struct WorkspaceTools {
    root: PathBuf,
    read_max_bytes: usize,
}

impl WorkspaceTools {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Result<Self, String> {
        let requested = workspace_root.into();
        let root = fs::canonicalize(&requested)
            .map_err(|error| format!("Cannot resolve workspace root {}: {error}", requested.display()))?;
        if !root.is_dir() {
            return Err("Workspace root must be a directory".to_string());
        }

        Ok(Self {
            root,
            read_max_bytes: DEFAULT_READ_MAX_BYTES,
        })
    }

    #[must_use]
    pub fn with_read_limit(mut self, read_max_bytes: usize) -> Self {
        self.read_max_bytes = read_max_bytes;
        self
    }

    pub fn workspace_root(&self) -> &Path {
        &self.root
    }

    /// UTF-8 contents of `path`, refused above the read limit.
    pub fn read_file(&self, path: &str) -> ToolOutput {
        finish("read_file", path, self.read(path))
    }

    /// Creates or replaces `path`, creating missing parent directories.
    pub fn write_file(&self, path: &str, content: &str) -> ToolOutput {
        finish("write_file", path, self.write(path, content))
    }

    /// Replaces the single occurrence of `old_text` in `path`.
    pub fn edit_file(&self, path: &str, old_text: &str, new_text: &str) -> ToolOutput {
        finish("edit_file", path, self.edit(path, old_text, new_text))
    }

    fn read(&self, path: &str) -> Result<String, String> {
        let target = self.existing(path)?;
        let bytes = fs::read(&target)
            .map_err(|error| format!("Cannot read {}: {error}", self.shown(&target)))?;
        if bytes.len() > self.read_max_bytes {
            return Err(format!(
                "File exceeds max read size ({} bytes > {} bytes)",
                bytes.len(),
                self.read_max_bytes
            ));
        }
        String::from_utf8(bytes).map_err(|_| "File is not valid UTF-8 text".to_string())
    }

    fn write(&self, path: &str, content: &str) -> Result<String, String> {
        let target = self.joined(path)?;
        let parent = target
            .parent()
            .ok_or_else(|| format!("Cannot write {}: no parent directory", target.display()))?;
        self.confine(&nearest_existing_ancestor(parent)?)?;

        fs::create_dir_all(parent)
            .map_err(|error| format!("Cannot create {}: {error}", self.shown(parent)))?;
        let created = fs::canonicalize(parent)
            .map_err(|error| format!("Cannot resolve {}: {error}", parent.display()))?;
        self.confine(&created)?;

        fs::write(&target, content)
            .map_err(|error| format!("Cannot write {}: {error}", self.shown(&target)))?;
        Ok(format!("Wrote {}", self.shown(&target)))
    }

    fn edit(&self, path: &str, old_text: &str, new_text: &str) -> Result<String, String> {
        if old_text.is_empty() {
            return Err("old_text must not be empty".to_string());
        }

        let target = self.existing(path)?;
        let original = fs::read_to_string(&target)
            .map_err(|error| format!("Cannot read {}: {error}", self.shown(&target)))?;
        let matches = original.matches(old_text).count();
        if matches != 1 {
            return Err(format!(
                "edit_file requires exactly one match; found {matches}"
            ));
        }

        fs::write(&target, original.replacen(old_text, new_text, 1))
            .map_err(|error| format!("Cannot write {}: {error}", self.shown(&target)))?;
        Ok(format!("Updated {}", self.shown(&target)))
    }

    /// `path` joined onto the root unless it is already absolute.
    fn joined(&self, path: &str) -> Result<PathBuf, String> {
        if path.trim().is_empty() {
            return Err("Path must not be empty".to_string());
        }
        Ok(self.root.join(path))
    }

    /// Canonical form of an existing `path` inside the root.
    fn existing(&self, path: &str) -> Result<PathBuf, String> {
        let joined = self.joined(path)?;
        let target = fs::canonicalize(&joined)
            .map_err(|error| format!("Cannot resolve {}: {error}", joined.display()))?;
        self.confine(&target)?;
        Ok(target)
    }

    fn confine(&self, canonical: &Path) -> Result<(), String> {
        if canonical.starts_with(&self.root) {
            return Ok(());
        }
        Err(format!(
            "Path escapes workspace root: {}",
            canonical.display()
        ))
    }

    fn shown(&self, path: &Path) -> String {
        match path.strip_prefix(&self.root) {
            Ok(relative) => relative.display().to_string(),
            Err(_) => path.display().to_string(),
        }
    }
}

fn finish(tool: &str, path: &str, result: Result<String, String>) -> ToolOutput {
    match result {
        Ok(content) => ToolOutput::ok(content),
        Err(error) => {
            debug!(tool, path, %error, "workspace tool failed");
            ToolOutput::fail(error)
        }
    }
}

fn nearest_existing_ancestor(path: &Path) -> Result<PathBuf, String> {
    let existing = path
        .ancestors()
        .find(|ancestor| ancestor.exists())
        .ok_or_else(|| format!("No existing ancestor for {}", path.display()))?;
    fs::canonicalize(existing)
        .map_err(|error| format!("Cannot resolve {}: {error}", existing.display()))
}

use agent_runtime::{Message, Role};
use serde::{Deserialize, Serialize};

pub const PREVIEW_CHARS: usize = 50;
pub const NO_HUMAN_MESSAGE: &str = "No human message";

/// On-disk shape of one saved conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    /// RFC3339 time of the last save.
    pub timestamp: String,
    #[serde(default)]
    pub project_root: Option<String>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl SessionRecord {
    /// First human message truncated to [`PREVIEW_CHARS`] characters.
    #[must_use]
    pub fn preview(&self) -> String {
        self.messages
            .iter()
            .find(|message| message.role == Role::Human)
            .map(|message| truncate_preview(&message.text()))
            .unwrap_or_else(|| NO_HUMAN_MESSAGE.to_string())
    }
}

fn truncate_preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_CHARS {
        let head = text.chars().take(PREVIEW_CHARS).collect::<String>();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

const REMINDER_PREVIEW_COUNT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl TodoStatus {
    #[must_use]
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub title: String,
    #[serde(default = "default_status")]
    pub status: TodoStatus,
}

fn default_status() -> TodoStatus {
    TodoStatus::Pending
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(id) => Ok(id),
        Value::Number(id) => Ok(id.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "todo id must be a string or number, got {other}"
        ))),
    }
}

/// Text returned to the model after a todo update.
#[must_use]
pub fn todo_reminder(todos: &[TodoItem]) -> String {
    let unfinished = todos
        .iter()
        .filter(|todo| !todo.status.is_finished())
        .collect::<Vec<_>>();

    if unfinished.is_empty() {
        return "All tasks completed. You can now reply to the user.".to_string();
    }

    let mut summary = unfinished
        .iter()
        .take(REMINDER_PREVIEW_COUNT)
        .map(|todo| format!("#{} {}", todo.id, todo.title))
        .collect::<Vec<_>>()
        .join(", ");
    if unfinished.len() > REMINDER_PREVIEW_COUNT {
        summary.push_str(&format!(
            " and {} more",
            unfinished.len() - REMINDER_PREVIEW_COUNT
        ));
    }

    format!(
        "--- TASK STATUS ---\nPending: {summary}\nAction: Complete these before finishing. Use 'todo_write' to track progress."
    )
}

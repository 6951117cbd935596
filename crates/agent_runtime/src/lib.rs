//! Provider-neutral contract between the console and an external agent runtime.
//!
//! The runtime is a black box that accepts the new message(s) of one turn plus a
//! small configuration bag, and reports progress as an ordered stream of
//! [`AgentEvent`]s: incremental [`AgentEvent::Delta`] chunks of the assistant
//! message being generated and finalized [`AgentEvent::Update`] snapshots once a
//! processing step completes. Tool calls the host owns are executed through a
//! host callback. This crate intentionally carries no transport or model logic.

use std::borrow::Cow;
use std::sync::{atomic::AtomicBool, Arc};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier for one agent turn.
pub type TurnId = u64;

/// Shared cancellation flag for a turn.
pub type CancelSignal = Arc<AtomicBool>;

/// Author of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Human,
    Assistant,
    Tool,
}

impl Role {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// Message body: plain text, or structured parts (for example multimodal input)
/// that must survive persistence untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<Value>),
}

impl MessageContent {
    /// Returns a display form of the content. Structured parts contribute their
    /// `text` fields; other parts are rendered as compact JSON.
    #[must_use]
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Self::Text(text) => Cow::Borrowed(text),
            Self::Parts(parts) => Cow::Owned(
                parts
                    .iter()
                    .map(|part| match part.get("text").and_then(Value::as_str) {
                        Some(text) => text.to_string(),
                        None => part.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.is_empty(),
            Self::Parts(parts) => parts.is_empty(),
        }
    }
}

impl Default for MessageContent {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// Fully-formed tool invocation carried by a finalized assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

impl ToolCall {
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }
}

/// One ordered entry of a conversation.
///
/// `tool_calls` is only populated for assistant messages and `tool_call_id`
/// only for tool messages; a tool message must reference a call emitted by an
/// earlier assistant message of the same conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub content: MessageContent,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    #[must_use]
    pub fn human(content: impl Into<MessageContent>) -> Self {
        Self {
            id: None,
            role: Role::Human,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    #[must_use]
    pub fn assistant(content: impl Into<MessageContent>) -> Self {
        Self {
            role: Role::Assistant,
            ..Self::human(content)
        }
    }

    #[must_use]
    pub fn assistant_with_tool_calls(
        content: impl Into<MessageContent>,
        tool_calls: Vec<ToolCall>,
    ) -> Self {
        Self {
            tool_calls,
            ..Self::assistant(content)
        }
    }

    #[must_use]
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<MessageContent>,
    ) -> Self {
        Self {
            role: Role::Tool,
            tool_call_id: Some(tool_call_id.into()),
            name: Some(name.into()),
            ..Self::human(content)
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn text(&self) -> Cow<'_, str> {
        self.content.as_text()
    }
}

/// Returns the index of the first tool message whose `tool_call_id` does not
/// reference a tool call emitted by an earlier assistant message.
#[must_use]
pub fn first_unmatched_tool_result(messages: &[Message]) -> Option<usize> {
    let mut seen_calls = std::collections::HashSet::new();

    for (index, message) in messages.iter().enumerate() {
        match message.role {
            Role::Assistant => {
                seen_calls.extend(message.tool_calls.iter().map(|call| call.id.as_str()));
            }
            Role::Tool => {
                let matched = message
                    .tool_call_id
                    .as_deref()
                    .is_some_and(|id| seen_calls.contains(id));
                if !matched {
                    return Some(index);
                }
            }
            Role::Human => {}
        }
    }

    None
}

/// Fragment of a tool call streamed as part of an in-progress assistant message.
///
/// `args` is a partial argument string that is usually not valid JSON on its own.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCallChunk {
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub args: String,
}

/// Incremental chunk of the assistant message currently being generated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageChunk {
    pub id: Option<String>,
    pub content: String,
    pub tool_call_chunks: Vec<ToolCallChunk>,
}

impl MessageChunk {
    #[must_use]
    pub fn text(id: Option<&str>, content: impl Into<String>) -> Self {
        Self {
            id: id.map(str::to_string),
            content: content.into(),
            tool_call_chunks: Vec::new(),
        }
    }
}

/// Event emitted by a runtime while it processes one turn.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// Partial assistant output.
    Delta(MessageChunk),
    /// Finalized messages produced by the processing step `node`.
    Update { node: String, messages: Vec<Message> },
}

/// Configuration bag passed along with every runtime call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnConfig {
    /// Key of the runtime-side conversation thread.
    pub thread_id: String,
    /// Maximum number of internal steps for one turn.
    pub recursion_limit: u32,
}

/// Input required to start one agent turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnRequest {
    pub turn_id: TurnId,
    pub messages: Vec<Message>,
    pub config: TurnConfig,
}

/// Result of a host-executed tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub ok: bool,
    pub content: String,
}

impl ToolOutput {
    #[must_use]
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            ok: true,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn fail(content: impl Into<String>) -> Self {
        Self {
            ok: false,
            content: content.into(),
        }
    }
}

/// Immutable metadata describing a runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeProfile {
    pub runtime_id: String,
    pub model_id: String,
}

/// Interface of the external agent runtime.
pub trait AgentRuntime: Send + Sync + 'static {
    /// Returns runtime/model identity metadata.
    fn profile(&self) -> RuntimeProfile;

    /// Replaces the runtime-side history of `config.thread_id`, used when a
    /// persisted conversation is resumed.
    fn seed_history(&self, config: &TurnConfig, messages: Vec<Message>) -> Result<(), String> {
        let _ = (config, messages);
        Err("History seeding is not supported by this runtime".to_string())
    }

    /// Runs one turn and emits events in runtime order.
    ///
    /// `execute_tool` asks the host to run a tool call; `None` means the host
    /// does not own that tool and the runtime must handle it itself. Both
    /// callbacks are invoked serially from the calling thread.
    fn run_turn(
        &self,
        req: TurnRequest,
        cancel: CancelSignal,
        execute_tool: &mut dyn FnMut(&ToolCall) -> Option<ToolOutput>,
        emit: &mut dyn FnMut(AgentEvent),
    ) -> Result<(), String>;
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    struct MinimalRuntime;

    impl AgentRuntime for MinimalRuntime {
        fn profile(&self) -> RuntimeProfile {
            RuntimeProfile {
                runtime_id: "minimal".to_string(),
                model_id: "minimal-model".to_string(),
            }
        }

        fn run_turn(
            &self,
            _req: TurnRequest,
            _cancel: CancelSignal,
            _execute_tool: &mut dyn FnMut(&ToolCall) -> Option<ToolOutput>,
            emit: &mut dyn FnMut(AgentEvent),
        ) -> Result<(), String> {
            emit(AgentEvent::Update {
                node: "model".to_string(),
                messages: vec![Message::assistant("done")],
            });
            Ok(())
        }
    }

    #[test]
    fn default_seed_history_reports_unsupported() {
        let config = TurnConfig {
            thread_id: "thread".to_string(),
            recursion_limit: 10,
        };
        let error = MinimalRuntime
            .seed_history(&config, Vec::new())
            .expect_err("minimal runtime should not support seeding");

        assert_eq!(error, "History seeding is not supported by this runtime");
    }

    #[test]
    fn message_serialization_keeps_tool_fields_and_skips_empty_ones() {
        let call = ToolCall::new("call-1", "bash", json!({"command": "ls"}));
        let assistant = Message::assistant_with_tool_calls("running", vec![call]);
        let tool = Message::tool_result("call-1", "bash", "```\nfile\n```");
        let human = Message::human("hi");

        assert_eq!(
            serde_json::to_value(&assistant).expect("serialize assistant"),
            json!({
                "role": "assistant",
                "content": "running",
                "tool_calls": [{"id": "call-1", "name": "bash", "args": {"command": "ls"}}],
            })
        );
        assert_eq!(
            serde_json::to_value(&tool).expect("serialize tool"),
            json!({
                "role": "tool",
                "content": "```\nfile\n```",
                "tool_call_id": "call-1",
                "name": "bash",
            })
        );
        assert_eq!(
            serde_json::to_value(&human).expect("serialize human"),
            json!({"role": "human", "content": "hi"})
        );
    }

    #[test]
    fn structured_content_survives_serde_and_renders_text_parts() {
        let raw = json!({
            "role": "human",
            "content": [{"type": "text", "text": "look"}, {"type": "image", "url": "x.png"}],
        });
        let message: Message = serde_json::from_value(raw.clone()).expect("parse structured");

        assert!(matches!(message.content, MessageContent::Parts(ref parts) if parts.len() == 2));
        assert_eq!(serde_json::to_value(&message).expect("serialize"), raw);
        assert_eq!(
            message.text(),
            "look\n{\"type\":\"image\",\"url\":\"x.png\"}"
        );
    }

    #[test]
    fn unmatched_tool_result_is_reported_by_index() {
        let messages = vec![
            Message::human("go"),
            Message::assistant_with_tool_calls("", vec![ToolCall::new("a", "ls", json!({}))]),
            Message::tool_result("a", "ls", "ok"),
            Message::tool_result("b", "ls", "orphan"),
        ];

        assert_eq!(first_unmatched_tool_result(&messages[..3]), None);
        assert_eq!(first_unmatched_tool_result(&messages), Some(3));
    }

    #[test]
    fn tool_output_constructors_set_flag() {
        assert_eq!(
            ToolOutput::ok("done"),
            ToolOutput {
                ok: true,
                content: "done".to_string()
            }
        );
        assert!(!ToolOutput::fail("nope").ok);
    }
}

//! Deterministic scripted implementation of the `agent_runtime` contract.
//!
//! This crate contains no model logic and is intended for local development and
//! contract-level integration testing. Turns follow queued scripts; when no
//! script is queued the runtime echoes the user's text, and input starting with
//! `!` is turned into a `bash` tool call.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use agent_runtime::{
    AgentEvent, AgentRuntime, CancelSignal, Message, MessageChunk, Role, RuntimeProfile,
    ToolCall, ToolCallChunk, ToolOutput, TurnConfig, TurnRequest,
};
use serde_json::json;
use tracing::debug;

/// Stable runtime identifier used for explicit startup selection.
pub const MOCK_RUNTIME_ID: &str = "mock";

/// Tools whose results the mock runtime reports inside a fenced code block.
const FENCED_RESULT_TOOLS: [&str; 4] = ["bash", "ls", "grep", "tree"];
const TOOL_ARGS_CHUNK_CHARS: usize = 8;

/// One scripted action of a mock turn.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptStep {
    /// Streams `text` as an assistant message, then finalizes it.
    Say(String),
    /// Streams an assistant message carrying `calls`, finalizes it, asks the host
    /// to execute every call and reports the results as tool messages.
    CallTools { text: String, calls: Vec<ToolCall> },
    /// Aborts the turn with an error.
    Fail(String),
}

/// Deterministic runtime used by `coding_agent` tests and local runs.
#[derive(Debug)]
pub struct MockRuntime {
    scripts: Mutex<VecDeque<Vec<ScriptStep>>>,
    threads: Mutex<HashMap<String, Vec<Message>>>,
    requests: Mutex<Vec<TurnRequest>>,
    token_delay: Duration,
    next_message_id: AtomicU64,
    next_call_id: AtomicU64,
}

impl MockRuntime {
    const DEFAULT_TOKEN_DELAY_MS: u64 = 25;

    /// Creates a runtime that streams without artificial delays.
    #[must_use]
    pub fn new() -> Self {
        Self::with_token_delay(Duration::ZERO)
    }

    #[must_use]
    pub fn with_token_delay(token_delay: Duration) -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            threads: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            token_delay,
            next_message_id: AtomicU64::new(1),
            next_call_id: AtomicU64::new(1),
        }
    }

    /// Queues the script for the next turn that has not started yet.
    pub fn push_turn(&self, steps: Vec<ScriptStep>) {
        lock_unpoisoned(&self.scripts).push_back(steps);
    }

    /// Returns every request received so far, in arrival order.
    #[must_use]
    pub fn requests(&self) -> Vec<TurnRequest> {
        lock_unpoisoned(&self.requests).clone()
    }

    /// Returns the runtime-side history kept for `thread_id`.
    #[must_use]
    pub fn thread_history(&self, thread_id: &str) -> Vec<Message> {
        lock_unpoisoned(&self.threads)
            .get(thread_id)
            .cloned()
            .unwrap_or_default()
    }

    fn default_script(&self, messages: &[Message]) -> Vec<ScriptStep> {
        let text = messages
            .iter()
            .rev()
            .find(|message| message.role == Role::Human)
            .map(|message| message.text().trim().to_string())
            .unwrap_or_default();

        if let Some(command) = text.strip_prefix('!') {
            let call_id = format!(
                "mock-call-{}",
                self.next_call_id.fetch_add(1, Ordering::SeqCst)
            );
            return vec![
                ScriptStep::CallTools {
                    text: "Running that for you.".to_string(),
                    calls: vec![ToolCall::new(
                        call_id,
                        "bash",
                        json!({ "command": command.trim() }),
                    )],
                },
                ScriptStep::Say("Command finished.".to_string()),
            ];
        }

        vec![ScriptStep::Say(format!("You said: {text}"))]
    }

    fn next_message_id(&self) -> String {
        format!(
            "mock-msg-{}",
            self.next_message_id.fetch_add(1, Ordering::SeqCst)
        )
    }

    fn stream_text(&self, message_id: &str, text: &str, emit: &mut dyn FnMut(AgentEvent)) {
        let mut pending_token = String::new();
        for ch in text.chars() {
            pending_token.push(ch);

            if matches!(ch, ' ' | '\n') {
                emit(AgentEvent::Delta(MessageChunk::text(
                    Some(message_id),
                    std::mem::take(&mut pending_token),
                )));
                self.pause();
            }
        }

        if !pending_token.is_empty() {
            emit(AgentEvent::Delta(MessageChunk::text(
                Some(message_id),
                pending_token,
            )));
            self.pause();
        }
    }

    fn stream_tool_calls(
        &self,
        message_id: &str,
        calls: &[ToolCall],
        emit: &mut dyn FnMut(AgentEvent),
    ) {
        for (index, call) in calls.iter().enumerate() {
            let args = call.args.to_string();
            let chars = args.chars().collect::<Vec<_>>();
            let mut pieces = chars
                .chunks(TOOL_ARGS_CHUNK_CHARS)
                .map(|piece| piece.iter().collect::<String>());

            let first = ToolCallChunk {
                index,
                id: Some(call.id.clone()),
                name: Some(call.name.clone()),
                args: pieces.next().unwrap_or_default(),
            };
            emit(AgentEvent::Delta(tool_chunk(message_id, first)));
            self.pause();

            for piece in pieces {
                let chunk = ToolCallChunk {
                    index,
                    args: piece,
                    ..ToolCallChunk::default()
                };
                emit(AgentEvent::Delta(tool_chunk(message_id, chunk)));
                self.pause();
            }
        }
    }

    fn pause(&self) {
        if !self.token_delay.is_zero() {
            thread::sleep(self.token_delay);
        }
    }

    fn record(&self, thread_id: &str, messages: &[Message]) {
        lock_unpoisoned(&self.threads)
            .entry(thread_id.to_string())
            .or_default()
            .extend_from_slice(messages);
    }
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::with_token_delay(Duration::from_millis(Self::DEFAULT_TOKEN_DELAY_MS))
    }
}

impl AgentRuntime for MockRuntime {
    fn profile(&self) -> RuntimeProfile {
        RuntimeProfile {
            runtime_id: MOCK_RUNTIME_ID.to_string(),
            model_id: "mock-model".to_string(),
        }
    }

    fn seed_history(&self, config: &TurnConfig, messages: Vec<Message>) -> Result<(), String> {
        debug!(thread_id = %config.thread_id, count = messages.len(), "seeding mock thread");
        lock_unpoisoned(&self.threads).insert(config.thread_id.clone(), messages);
        Ok(())
    }

    fn run_turn(
        &self,
        req: TurnRequest,
        cancel: CancelSignal,
        execute_tool: &mut dyn FnMut(&ToolCall) -> Option<ToolOutput>,
        emit: &mut dyn FnMut(AgentEvent),
    ) -> Result<(), String> {
        lock_unpoisoned(&self.requests).push(req.clone());
        let thread_id = req.config.thread_id.clone();
        self.record(&thread_id, &req.messages);

        let queued = lock_unpoisoned(&self.scripts).pop_front();
        let script = queued.unwrap_or_else(|| self.default_script(&req.messages));

        for (step_index, step) in script.into_iter().enumerate() {
            if cancel.load(Ordering::SeqCst) {
                return Ok(());
            }

            if step_index as u32 >= req.config.recursion_limit {
                return Err(format!(
                    "Recursion limit of {} reached without finishing the turn",
                    req.config.recursion_limit
                ));
            }

            match step {
                ScriptStep::Say(text) => {
                    let message_id = self.next_message_id();
                    self.stream_text(&message_id, &text, emit);

                    let message = Message::assistant(text).with_id(message_id);
                    self.record(&thread_id, std::slice::from_ref(&message));
                    emit(AgentEvent::Update {
                        node: "model".to_string(),
                        messages: vec![message],
                    });
                }
                ScriptStep::CallTools { text, calls } => {
                    let message_id = self.next_message_id();
                    self.stream_text(&message_id, &text, emit);
                    self.stream_tool_calls(&message_id, &calls, emit);

                    let assistant = Message::assistant_with_tool_calls(text, calls.clone())
                        .with_id(message_id);
                    self.record(&thread_id, std::slice::from_ref(&assistant));
                    emit(AgentEvent::Update {
                        node: "model".to_string(),
                        messages: vec![assistant],
                    });

                    let mut results = Vec::with_capacity(calls.len());
                    for call in &calls {
                        if cancel.load(Ordering::SeqCst) {
                            return Ok(());
                        }

                        let content = match execute_tool(call) {
                            Some(output) => format_tool_content(&call.name, &output),
                            None => format!("Tool '{}' is not available", call.name),
                        };
                        results.push(
                            Message::tool_result(call.id.clone(), call.name.clone(), content)
                                .with_id(self.next_message_id()),
                        );
                    }

                    self.record(&thread_id, &results);
                    emit(AgentEvent::Update {
                        node: "tools".to_string(),
                        messages: results,
                    });
                }
                ScriptStep::Fail(error) => return Err(error),
            }
        }

        Ok(())
    }
}

fn tool_chunk(message_id: &str, chunk: ToolCallChunk) -> MessageChunk {
    MessageChunk {
        id: Some(message_id.to_string()),
        content: String::new(),
        tool_call_chunks: vec![chunk],
    }
}

fn format_tool_content(tool_name: &str, output: &ToolOutput) -> String {
    if FENCED_RESULT_TOOLS.contains(&tool_name) {
        format!("```\n{}\n```", output.content)
    } else {
        output.content.clone()
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

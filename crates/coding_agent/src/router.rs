use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use agent_runtime::Message;
use regex::Regex;
use tracing::debug;

use crate::invocation::ToolInvocation;
use crate::ui::{Surface, UiEvent};

/// Where the result of a pending call is shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingTarget {
    Shell,
    Editor { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingToolCall {
    pub call_id: String,
    pub target: PendingTarget,
    /// Preview line for shell calls, path for editor calls.
    pub display: String,
}

/// Command to run in the shell session on behalf of a dispatched call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellRequest {
    pub call_id: String,
    pub command: String,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct RouterOutput {
    pub events: Vec<UiEvent>,
    pub shell: Vec<ShellRequest>,
}

/// Maps finalized tool calls and their results onto UI surfaces.
#[derive(Debug)]
pub struct ToolCallRouter {
    workspace_root: PathBuf,
    pending: HashMap<String, PendingToolCall>,
}

impl ToolCallRouter {
    #[must_use]
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            pending: HashMap::new(),
        }
    }

    /// Routes every tool call of a finalized assistant message.
    pub fn dispatch(&mut self, message: &Message) -> RouterOutput {
        let mut output = RouterOutput::default();

        for call in &message.tool_calls {
            let invocation = ToolInvocation::parse(call);
            if invocation.is_shell() {
                let preview = invocation.preview().unwrap_or_default();
                self.remember(&call.id, PendingTarget::Shell, preview.clone());
                output.events.push(UiEvent::write_terminal(preview));
                output.events.push(UiEvent::Focus {
                    surface: Surface::Terminal,
                });

                if let ToolInvocation::Bash { command, .. } = &invocation {
                    output.shell.push(ShellRequest {
                        call_id: call.id.clone(),
                        command: command.clone(),
                        timeout: invocation.timeout(),
                    });
                }
                continue;
            }

            match &invocation {
                ToolInvocation::ReadFile { path } => {
                    output.events.push(UiEvent::OpenFile {
                        path: self.resolve(path),
                        content: None,
                        read_only: true,
                    });
                    output.events.push(UiEvent::Focus {
                        surface: Surface::Editor,
                    });
                }
                ToolInvocation::WriteFile { path, content } => {
                    let resolved = self.resolve(path);
                    self.remember(
                        &call.id,
                        PendingTarget::Editor {
                            path: resolved.clone(),
                        },
                        path.clone(),
                    );
                    output.events.push(UiEvent::OpenFile {
                        path: resolved,
                        content: Some(content.clone()),
                        read_only: false,
                    });
                    output.events.push(UiEvent::Focus {
                        surface: Surface::Editor,
                    });
                }
                ToolInvocation::EditFile { path, .. } => {
                    let resolved = self.resolve(path);
                    self.remember(
                        &call.id,
                        PendingTarget::Editor {
                            path: resolved.clone(),
                        },
                        path.clone(),
                    );
                    output.events.push(UiEvent::OpenFile {
                        path: resolved,
                        content: None,
                        read_only: false,
                    });
                    output.events.push(UiEvent::Focus {
                        surface: Surface::Editor,
                    });
                }
                ToolInvocation::TodoWrite { todos } => {
                    output.events.push(UiEvent::SetTodos {
                        todos: todos.clone(),
                    });
                    output.events.push(UiEvent::Focus {
                        surface: Surface::Todo,
                    });
                }
                ToolInvocation::Unknown { name, .. } => {
                    debug!(tool = %name, call_id = %call.id, "no surface for tool call");
                }
                ToolInvocation::Bash { .. }
                | ToolInvocation::Ls { .. }
                | ToolInvocation::Grep { .. }
                | ToolInvocation::Tree { .. } => {}
            }
        }

        output
    }

    /// Routes a tool-result message back to the surface of its call.
    ///
    /// Results for ids that are not pending produce nothing.
    pub fn dispatch_result(&mut self, message: &Message) -> Vec<UiEvent> {
        let Some(call_id) = message.tool_call_id.as_deref() else {
            return Vec::new();
        };
        let Some(pending) = self.pending.remove(call_id) else {
            return Vec::new();
        };

        match pending.target {
            PendingTarget::Shell => {
                let text = message.text();
                vec![UiEvent::write_terminal(extract_fenced_block(&text))]
            }
            PendingTarget::Editor { path } => vec![UiEvent::OpenFile {
                path,
                content: None,
                read_only: false,
            }],
        }
    }

    #[must_use]
    pub fn pending(&self, call_id: &str) -> Option<&PendingToolCall> {
        self.pending.get(call_id)
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    fn remember(&mut self, call_id: &str, target: PendingTarget, display: String) {
        self.pending.insert(
            call_id.to_string(),
            PendingToolCall {
                call_id: call_id.to_string(),
                target,
                display,
            },
        );
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let path = PathBuf::from(path);
        if path.is_absolute() {
            path
        } else {
            self.workspace_root.join(path)
        }
    }
}

fn fenced_block_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r"(?s)```[^\n]*\n(.*?)```").expect("fenced block regex must compile")
    })
}

/// Body of the first fenced code block in `text`, or `text` itself.
#[must_use]
pub fn extract_fenced_block(text: &str) -> String {
    match fenced_block_regex().captures(text).and_then(|captures| captures.get(1)) {
        Some(body) => body.as_str().trim_end_matches('\n').to_string(),
        None => text.to_string(),
    }
}

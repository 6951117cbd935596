//! Line-oriented console front end.
//!
//! Stdin lines and controller [`UiEvent`]s travel over one channel so the main
//! thread can render everything in arrival order.

use std::io::{self, BufRead, Write};
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};

use agent_runtime::{Message, Role};
use tracing::debug;

use crate::todos::{TodoItem, TodoStatus};
use crate::ui::{UiEvent, UiMessageId};

const TERMINAL_PREFIX: &str = "│ ";
const CLEAR_RULE: &str = "────────────────────────────────────────";

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleEvent {
    Input(String),
    InputClosed,
    Ui(UiEvent),
}

/// Forwards stdin lines until EOF, then reports [`ConsoleEvent::InputClosed`].
pub fn spawn_stdin_reader(sender: Sender<ConsoleEvent>) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("coding-agent-stdin".to_string())
        .spawn(move || {
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(error) => {
                        debug!(%error, "stdin read failed");
                        break;
                    }
                };
                if sender.send(ConsoleEvent::Input(line)).is_err() {
                    return;
                }
            }
            let _ = sender.send(ConsoleEvent::InputClosed);
        })
}

/// Message whose text is still on the current output line.
#[derive(Debug)]
struct OpenLine {
    ui_id: UiMessageId,
    printed: String,
}

/// Renders UI events as plain text.
pub struct ConsoleRenderer<W: Write> {
    out: W,
    open: Option<OpenLine>,
}

impl<W: Write> ConsoleRenderer<W> {
    pub fn new(out: W) -> Self {
        Self { out, open: None }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Writes one event. Returns `true` once the session asked to exit.
    pub fn render(&mut self, event: &UiEvent) -> io::Result<bool> {
        match event {
            UiEvent::AppendMessage { ui_id, message } => {
                self.close_line()?;
                self.start_message(*ui_id, message)?;
            }
            UiEvent::UpdateMessage { ui_id, message } => self.update_message(*ui_id, message)?,
            UiEvent::WriteTerminal { text } => {
                self.close_line()?;
                for line in text.lines() {
                    writeln!(self.out, "{TERMINAL_PREFIX}{line}")?;
                }
            }
            UiEvent::OpenFile {
                path, read_only, ..
            } => {
                self.close_line()?;
                let mode = if *read_only { " (read-only)" } else { "" };
                writeln!(self.out, "[editor] {}{mode}", path.display())?;
            }
            UiEvent::SetTodos { todos } => {
                self.close_line()?;
                self.write_todos(todos)?;
            }
            UiEvent::ClearAll => {
                self.close_line()?;
                writeln!(self.out, "{CLEAR_RULE}")?;
            }
            UiEvent::Generating { active: false } => self.close_line()?,
            UiEvent::Generating { active: true } | UiEvent::Focus { .. } => {}
            UiEvent::Exit => {
                self.close_line()?;
                self.out.flush()?;
                return Ok(true);
            }
        }

        self.out.flush()?;
        Ok(false)
    }

    fn start_message(&mut self, ui_id: UiMessageId, message: &Message) -> io::Result<()> {
        let text = message.text().into_owned();
        write!(self.out, "{}{text}", role_prefix(message.role))?;
        self.open = Some(OpenLine {
            ui_id,
            printed: text,
        });
        self.finish_tool_calls(message)
    }

    fn update_message(&mut self, ui_id: UiMessageId, message: &Message) -> io::Result<()> {
        let text = message.text().into_owned();
        let suffix = match &self.open {
            Some(open) if open.ui_id == ui_id => text.strip_prefix(open.printed.as_str()),
            _ => None,
        };

        match suffix {
            Some(suffix) => {
                write!(self.out, "{suffix}")?;
                if let Some(open) = self.open.as_mut() {
                    open.printed = text.clone();
                }
                self.finish_tool_calls(message)
            }
            None => {
                self.close_line()?;
                self.start_message(ui_id, message)
            }
        }
    }

    /// A message with tool calls is final; list the calls and end the line.
    fn finish_tool_calls(&mut self, message: &Message) -> io::Result<()> {
        if message.tool_calls.is_empty() {
            return Ok(());
        }

        self.close_line()?;
        for call in &message.tool_calls {
            writeln!(self.out, "  -> {} {}", call.name, call.args)?;
        }
        Ok(())
    }

    fn write_todos(&mut self, todos: &[TodoItem]) -> io::Result<()> {
        writeln!(self.out, "[todo]")?;
        for todo in todos {
            let mark = match todo.status {
                TodoStatus::Pending => ' ',
                TodoStatus::InProgress => '~',
                TodoStatus::Completed => 'x',
                TodoStatus::Cancelled => '-',
            };
            writeln!(self.out, "  [{mark}] #{} {}", todo.id, todo.title)?;
        }
        Ok(())
    }

    fn close_line(&mut self) -> io::Result<()> {
        if self.open.take().is_some() {
            writeln!(self.out)?;
        }
        Ok(())
    }
}

fn role_prefix(role: Role) -> &'static str {
    match role {
        Role::Human => "> ",
        Role::Assistant => "agent: ",
        Role::Tool => "tool: ",
    }
}

//! Imperative operations the controller issues to whatever renders the session.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

use agent_runtime::Message;

use crate::todos::TodoItem;

/// Identifier of a message shown on the chat surface.
pub type UiMessageId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    Terminal,
    Editor,
    Todo,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    AppendMessage {
        ui_id: UiMessageId,
        message: Message,
    },
    /// Replaces the displayed copy of `ui_id`.
    UpdateMessage {
        ui_id: UiMessageId,
        message: Message,
    },
    WriteTerminal {
        text: String,
    },
    /// Shows `path` in the editor. Without `content` the renderer reads the file.
    OpenFile {
        path: PathBuf,
        content: Option<String>,
        read_only: bool,
    },
    SetTodos {
        todos: Vec<TodoItem>,
    },
    Focus {
        surface: Surface,
    },
    ClearAll,
    Generating {
        active: bool,
    },
    Exit,
}

impl UiEvent {
    #[must_use]
    pub fn write_terminal(text: impl Into<String>) -> Self {
        Self::WriteTerminal { text: text.into() }
    }
}

pub trait UiSink: Send + Sync {
    fn emit(&self, event: UiEvent);
}

/// Forwards events into a channel shared with other producers.
pub struct ChannelSink<T> {
    sender: Mutex<Sender<T>>,
    wrap: fn(UiEvent) -> T,
}

impl<T: Send> ChannelSink<T> {
    pub fn new(sender: Sender<T>, wrap: fn(UiEvent) -> T) -> Self {
        Self {
            sender: Mutex::new(sender),
            wrap,
        }
    }
}

impl<T: Send> UiSink for ChannelSink<T> {
    fn emit(&self, event: UiEvent) {
        let sender = crate::lock_unpoisoned(&self.sender);
        // A closed receiver means the renderer is gone; nothing left to show.
        let _ = sender.send((self.wrap)(event));
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<UiEvent>>,
}

impl RecordingSink {
    #[must_use]
    pub fn events(&self) -> Vec<UiEvent> {
        crate::lock_unpoisoned(&self.events).clone()
    }

    pub fn take(&self) -> Vec<UiEvent> {
        std::mem::take(&mut *crate::lock_unpoisoned(&self.events))
    }

    /// Concatenated text of every terminal write, one write per line.
    #[must_use]
    pub fn terminal_text(&self) -> String {
        crate::lock_unpoisoned(&self.events)
            .iter()
            .filter_map(|event| match event {
                UiEvent::WriteTerminal { text } => Some(format!("{text}\n")),
                _ => None,
            })
            .collect()
    }
}

impl UiSink for RecordingSink {
    fn emit(&self, event: UiEvent) {
        crate::lock_unpoisoned(&self.events).push(event);
    }
}

/// Hands out chat message ids that stay unique across turns and resets.
#[derive(Debug, Clone, Default)]
pub struct UiIdAllocator {
    next: Arc<AtomicU64>,
}

impl UiIdAllocator {
    pub fn next_id(&self) -> UiMessageId {
        self.next.fetch_add(1, Ordering::SeqCst) + 1
    }
}

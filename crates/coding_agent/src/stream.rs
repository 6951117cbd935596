//! Reassembly of streamed agent output into chat messages.
//!
//! Deltas grow one live message; the next `update` snapshot replaces it with the
//! authoritative version. Tool-call argument fragments inside deltas are never
//! surfaced: they are only acted on once the finalized message arrives.

use agent_runtime::{AgentEvent, Message, MessageChunk, Role};

use crate::ui::{UiIdAllocator, UiMessageId};

/// Chat-level effect of one runtime event.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatUpdate {
    /// First visible text of a streaming assistant message.
    Started { ui_id: UiMessageId, message: Message },
    /// The streaming message grew.
    Streamed { ui_id: UiMessageId, message: Message },
    /// Authoritative message from an `update` snapshot. `replaced` is true when
    /// it takes over the message previously surfaced under `ui_id`.
    Finalized {
        ui_id: UiMessageId,
        message: Message,
        replaced: bool,
    },
}

#[derive(Debug)]
struct StreamingMessage {
    ui_id: UiMessageId,
    message_id: Option<String>,
    content: String,
    surfaced: bool,
}

impl StreamingMessage {
    fn snapshot(&self) -> Message {
        let message = Message::assistant(self.content.clone());
        match &self.message_id {
            Some(id) => message.with_id(id.clone()),
            None => message,
        }
    }

    fn accepts(&self, message_id: Option<&str>) -> bool {
        match (self.message_id.as_deref(), message_id) {
            (Some(current), Some(incoming)) => current == incoming,
            _ => true,
        }
    }
}

#[derive(Debug)]
pub struct StreamAssembler {
    ids: UiIdAllocator,
    current: Option<StreamingMessage>,
}

impl StreamAssembler {
    #[must_use]
    pub fn new(ids: UiIdAllocator) -> Self {
        Self { ids, current: None }
    }

    pub fn push(&mut self, event: AgentEvent) -> Vec<ChatUpdate> {
        match event {
            AgentEvent::Delta(chunk) => self.push_delta(chunk).into_iter().collect(),
            AgentEvent::Update { messages, .. } => self.push_update(messages),
        }
    }

    /// Drops any partially streamed message.
    pub fn reset(&mut self) {
        self.current = None;
    }

    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.current.is_some()
    }

    fn push_delta(&mut self, chunk: MessageChunk) -> Option<ChatUpdate> {
        let continues = self
            .current
            .as_ref()
            .is_some_and(|current| current.accepts(chunk.id.as_deref()));
        if !continues {
            self.current = Some(StreamingMessage {
                ui_id: self.ids.next_id(),
                message_id: chunk.id.clone(),
                content: String::new(),
                surfaced: false,
            });
        }

        let current = self.current.as_mut()?;
        if current.message_id.is_none() {
            current.message_id = chunk.id;
        }
        if chunk.content.is_empty() {
            return None;
        }

        current.content.push_str(&chunk.content);
        let message = current.snapshot();
        if current.surfaced {
            Some(ChatUpdate::Streamed {
                ui_id: current.ui_id,
                message,
            })
        } else {
            current.surfaced = true;
            Some(ChatUpdate::Started {
                ui_id: current.ui_id,
                message,
            })
        }
    }

    fn push_update(&mut self, messages: Vec<Message>) -> Vec<ChatUpdate> {
        let mut streaming = self.current.take();
        let mut updates = Vec::with_capacity(messages.len());

        for message in messages {
            match message.role {
                Role::Assistant => {
                    let matched = match streaming.take() {
                        Some(current)
                            if current.surfaced && current.accepts(message.id.as_deref()) =>
                        {
                            Some(current)
                        }
                        other => {
                            streaming = other;
                            None
                        }
                    };
                    let update = match matched {
                        Some(current) => ChatUpdate::Finalized {
                            ui_id: current.ui_id,
                            message,
                            replaced: true,
                        },
                        None => ChatUpdate::Finalized {
                            ui_id: self.ids.next_id(),
                            message,
                            replaced: false,
                        },
                    };
                    updates.push(update);
                }
                Role::Tool => updates.push(ChatUpdate::Finalized {
                    ui_id: self.ids.next_id(),
                    message,
                    replaced: false,
                }),
                // Human input is shown when it is submitted.
                Role::Human => {}
            }
        }

        updates
    }
}

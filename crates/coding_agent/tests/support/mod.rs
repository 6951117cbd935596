#![allow(dead_code)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use agent_runtime::{Message, Role};
use agent_runtime_mock::MockRuntime;
use coding_agent::controller::{ControllerOptions, ConversationController};
use coding_agent::ui::{RecordingSink, UiEvent};
use session_store::SessionStore;
use tempfile::{tempdir, TempDir};

pub const IDLE_TIMEOUT: Duration = Duration::from_secs(20);

pub struct Harness {
    pub controller: Arc<ConversationController>,
    pub runtime: Arc<MockRuntime>,
    pub sink: Arc<RecordingSink>,
    pub store: SessionStore,
    pub workspace: TempDir,
    pub history: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_runtime(MockRuntime::new())
    }

    pub fn with_runtime(runtime: MockRuntime) -> Self {
        let workspace = tempdir().expect("workspace tempdir");
        let history = tempdir().expect("history tempdir");
        let runtime = Arc::new(runtime);
        let sink = Arc::new(RecordingSink::default());
        let store = SessionStore::new(history.path()).expect("session store");

        let controller = ConversationController::new(
            Arc::clone(&runtime) as Arc<dyn agent_runtime::AgentRuntime>,
            store.clone(),
            Arc::clone(&sink) as Arc<dyn coding_agent::ui::UiSink>,
            ControllerOptions::new(workspace.path()),
        )
        .expect("controller should start");

        Self {
            controller,
            runtime,
            sink,
            store,
            workspace,
            history,
        }
    }

    /// Submits `input` and waits for the resulting turn or reset to finish.
    pub fn run(&self, input: &str) {
        self.controller.submit(input);
        self.wait_idle();
    }

    pub fn wait_idle(&self) {
        assert!(
            self.controller.wait_idle(IDLE_TIMEOUT),
            "controller did not become idle in time"
        );
    }

    pub fn terminal_lines(&self) -> Vec<String> {
        self.sink
            .terminal_text()
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Texts of chat messages shown through append or update events.
    pub fn chat_texts(&self) -> Vec<String> {
        self.sink
            .events()
            .into_iter()
            .filter_map(|event| match event {
                UiEvent::AppendMessage { message, .. } | UiEvent::UpdateMessage { message, .. } => {
                    Some(message.text().into_owned())
                }
                _ => None,
            })
            .collect()
    }
}

pub fn roles(messages: &[Message]) -> Vec<Role> {
    messages.iter().map(|message| message.role).collect()
}

/// Polls `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while !condition() {
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(10));
    }
    true
}

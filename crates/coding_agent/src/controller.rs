use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use agent_runtime::{
    first_unmatched_tool_result, AgentEvent, AgentRuntime, CancelSignal, Message, Role, ToolCall,
    ToolOutput, TurnConfig, TurnId, TurnRequest,
};
use session_store::{is_valid_session_id, SessionStore};
use shell_session::{ShellConfig, ShellError, ShellSession, DEFAULT_COMMAND_TIMEOUT};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::commands::{parse_slash_command, ResumeTarget, SlashCommand, HELP_TEXT};
use crate::invocation::ToolInvocation;
use crate::lock_unpoisoned;
use crate::router::ToolCallRouter;
use crate::stream::{ChatUpdate, StreamAssembler};
use crate::todos::{todo_reminder, TodoItem};
use crate::tools::WorkspaceTools;
use crate::ui::{UiEvent, UiIdAllocator, UiSink};

pub const GREETING: &str = "Hello! How can I help you?";
pub const BUSY_MESSAGE: &str = "Agent is busy. Use /cancel to stop the current turn.";
pub const DEFAULT_RECURSION_LIMIT: u32 = 200;

const IDLE_POLL: Duration = Duration::from_millis(5);

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("invalid project root {path}: {message}")]
    ProjectRoot { path: PathBuf, message: String },

    #[error("failed to start shell session: {0}")]
    Shell(#[from] ShellError),
}

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub project_root: PathBuf,
    /// Shell launch parameters; `cwd` is always replaced by the project root.
    pub shell: ShellConfig,
    pub command_timeout: Duration,
    pub recursion_limit: u32,
}

impl ControllerOptions {
    #[must_use]
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            shell: ShellConfig::default(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkKind {
    Turn,
    Reset,
}

struct ActiveWork {
    id: u64,
    kind: WorkKind,
    cancel: CancelSignal,
    join_handle: Option<JoinHandle<()>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Reset {
    Clear,
    Resume(String),
}

struct Conversation {
    thread_id: String,
    session_id: Option<String>,
    messages: Vec<Message>,
    todos: Vec<TodoItem>,
    assembler: StreamAssembler,
    router: ToolCallRouter,
    /// Bash call ids of the current turn already sent to the shell, with
    /// their output once the command has returned.
    bash_calls: HashMap<String, Option<String>>,
}

impl Conversation {
    fn new(workspace_root: &Path, ids: &UiIdAllocator) -> Self {
        Self {
            thread_id: Uuid::new_v4().to_string(),
            session_id: None,
            messages: Vec::new(),
            todos: Vec::new(),
            assembler: StreamAssembler::new(ids.clone()),
            router: ToolCallRouter::new(workspace_root),
            bash_calls: HashMap::new(),
        }
    }
}

/// Owns one conversation, its shell session and the single in-flight turn.
///
/// Turns and resets run on worker threads; UI effects are pushed to the
/// [`UiSink`] while the conversation lock is held, so events from a cancelled
/// turn can never interleave with those of the reset that replaced it.
pub struct ConversationController {
    runtime: Arc<dyn AgentRuntime>,
    store: SessionStore,
    sink: Arc<dyn UiSink>,
    tools: WorkspaceTools,
    options: ControllerOptions,
    ids: UiIdAllocator,
    conversation: Mutex<Conversation>,
    shell: Mutex<Option<ShellSession>>,
    active: Mutex<Option<ActiveWork>>,
    next_work_id: AtomicU64,
    exited: AtomicBool,
}

impl ConversationController {
    /// Validates the project root and starts the shell session in it.
    pub fn new(
        runtime: Arc<dyn AgentRuntime>,
        store: SessionStore,
        sink: Arc<dyn UiSink>,
        mut options: ControllerOptions,
    ) -> Result<Arc<Self>, ControllerError> {
        let tools = WorkspaceTools::new(&options.project_root).map_err(|message| {
            ControllerError::ProjectRoot {
                path: options.project_root.clone(),
                message,
            }
        })?;
        options.project_root = tools.workspace_root().to_path_buf();
        options.shell.cwd = Some(options.project_root.clone());

        let shell = ShellSession::spawn(&options.shell)?;
        let ids = UiIdAllocator::default();
        let conversation = Conversation::new(&options.project_root, &ids);
        info!(
            project_root = %options.project_root.display(),
            runtime = %runtime.profile().runtime_id,
            "conversation controller ready"
        );

        Ok(Arc::new(Self {
            runtime,
            store,
            sink,
            tools,
            options,
            ids,
            conversation: Mutex::new(conversation),
            shell: Mutex::new(Some(shell)),
            active: Mutex::new(None),
            next_work_id: AtomicU64::new(1),
            exited: AtomicBool::new(false),
        }))
    }

    /// Shows the greeting.
    pub fn start(&self) {
        let _conversation = self.lock_conversation();
        self.emit_greeting();
    }

    /// Handles one line of user input: a slash command or a new turn.
    pub fn submit(self: &Arc<Self>, input: &str) {
        let input = input.trim();
        if input.is_empty() {
            return;
        }

        match parse_slash_command(input) {
            Some(command) => self.handle_command(command),
            None => self.start_turn(input.to_string()),
        }
    }

    #[must_use]
    pub fn project_root(&self) -> &Path {
        &self.options.project_root
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.lock_active().is_some()
    }

    #[must_use]
    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }

    /// Blocks until no turn or reset is in flight. Returns false on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.is_busy() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(IDLE_POLL);
        }
        true
    }

    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        self.lock_conversation().messages.clone()
    }

    #[must_use]
    pub fn todos(&self) -> Vec<TodoItem> {
        self.lock_conversation().todos.clone()
    }

    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.lock_conversation().session_id.clone()
    }

    #[must_use]
    pub fn thread_id(&self) -> String {
        self.lock_conversation().thread_id.clone()
    }

    /// Cancels the running turn, if any. The turn's worker keeps running until
    /// its current step returns, but nothing it produces is applied anymore.
    pub fn cancel_turn(&self) -> bool {
        let cancelled = {
            let mut active = self.lock_active();
            match active.as_ref() {
                Some(work) if work.kind == WorkKind::Turn => active.take(),
                _ => None,
            }
        };

        let Some(work) = cancelled else {
            return false;
        };
        work.cancel.store(true, Ordering::SeqCst);

        let mut conversation = self.lock_conversation();
        conversation.assembler.reset();
        conversation.bash_calls.clear();
        self.sink.emit(UiEvent::Generating { active: false });
        info!(turn_id = work.id, "turn cancelled");
        true
    }

    /// Saves the conversation and returns its session id. Empty conversations
    /// are not written. Failures are logged and reported as `None`.
    pub fn save_history(&self) -> Option<String> {
        let mut conversation = self.lock_conversation();
        if conversation.messages.is_empty() {
            return conversation.session_id.clone();
        }

        match self.store.save(
            &conversation.messages,
            conversation.session_id.as_deref(),
            Some(&self.options.project_root),
        ) {
            Ok(session_id) => {
                conversation.session_id = Some(session_id.clone());
                Some(session_id)
            }
            Err(error) => {
                error!(%error, "failed to save conversation");
                None
            }
        }
    }

    /// Cancels any turn, saves, closes the shell and asks the UI to exit.
    pub fn quit(&self) {
        if self.exited.swap(true, Ordering::SeqCst) {
            return;
        }

        self.cancel_turn();
        self.save_history();

        match self.shell.try_lock() {
            Ok(mut shell) => close_shell(&mut shell),
            Err(TryLockError::Poisoned(poisoned)) => close_shell(&mut poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => {
                warn!("shell session busy at exit; leaving it to terminate with the process");
            }
        }

        info!("conversation controller exiting");
        self.sink.emit(UiEvent::Exit);
    }

    fn handle_command(self: &Arc<Self>, command: SlashCommand) {
        match command {
            SlashCommand::Help => self.write_terminal(HELP_TEXT),
            SlashCommand::Cancel => {
                if self.cancel_turn() {
                    self.write_terminal("Turn cancelled");
                } else {
                    self.write_terminal("No active turn");
                }
            }
            SlashCommand::Quit => self.quit(),
            SlashCommand::Clear => {
                self.cancel_turn();
                self.start_reset(Reset::Clear);
            }
            SlashCommand::Resume(None) => self.list_sessions(),
            SlashCommand::Resume(Some(target)) => {
                let session_id = match target {
                    ResumeTarget::SessionId(id) => id,
                    ResumeTarget::Index(index) => {
                        let sessions = self
                            .store
                            .list(Some(&self.options.project_root))
                            .unwrap_or_default();
                        match sessions.into_iter().nth(index) {
                            Some(session) => session.id,
                            None => {
                                self.write_terminal(format!("Invalid session index: {index}"));
                                return;
                            }
                        }
                    }
                };

                self.cancel_turn();
                self.start_reset(Reset::Resume(session_id));
            }
            SlashCommand::Unknown(command) => {
                self.write_terminal(format!("Unknown command: {command}"));
            }
        }
    }

    fn list_sessions(&self) {
        let sessions = match self.store.list(Some(&self.options.project_root)) {
            Ok(sessions) => sessions,
            Err(error) => {
                self.write_terminal(format!("Error listing sessions: {error}"));
                return;
            }
        };

        let mut lines = vec!["Available sessions:".to_string()];
        if sessions.is_empty() {
            lines.push("- No sessions found.".to_string());
        } else {
            lines.extend(sessions.iter().enumerate().map(|(index, session)| {
                format!(
                    "[{index}] {} - {} ({})",
                    session.id, session.preview, session.timestamp
                )
            }));
            lines.push("Use /resume <index> to load a session.".to_string());
        }

        self.write_terminal(lines.join("\n"));
    }

    fn start_turn(self: &Arc<Self>, text: String) {
        let mut active = self.lock_active();
        if active.is_some() {
            self.write_terminal(BUSY_MESSAGE);
            return;
        }

        let turn_id = self.next_work_id.fetch_add(1, Ordering::SeqCst);
        let human = Message::human(text);
        let thread_id = {
            let mut conversation = self.lock_conversation();
            conversation.messages.push(human.clone());
            conversation.assembler.reset();
            conversation.router.clear();
            conversation.bash_calls.clear();
            self.sink.emit(UiEvent::AppendMessage {
                ui_id: self.ids.next_id(),
                message: human.clone(),
            });
            self.sink.emit(UiEvent::Generating { active: true });
            conversation.thread_id.clone()
        };

        let request = TurnRequest {
            turn_id,
            messages: vec![human],
            config: TurnConfig {
                thread_id,
                recursion_limit: self.options.recursion_limit,
            },
        };
        let cancel: CancelSignal = Arc::new(AtomicBool::new(false));
        let controller = Arc::clone(self);
        let worker_cancel = Arc::clone(&cancel);
        let spawned = thread::Builder::new()
            .name(format!("coding-agent-turn-{turn_id}"))
            .spawn(move || controller.run_turn_worker(request, worker_cancel));

        match spawned {
            Ok(join_handle) => {
                *active = Some(ActiveWork {
                    id: turn_id,
                    kind: WorkKind::Turn,
                    cancel,
                    join_handle: Some(join_handle),
                });
            }
            Err(error) => {
                drop(active);
                error!(%error, "failed to spawn turn worker");
                self.append_error(&format!("Failed to start turn: {error}"));
                self.sink.emit(UiEvent::Generating { active: false });
            }
        }
    }

    fn run_turn_worker(self: Arc<Self>, request: TurnRequest, cancel: CancelSignal) {
        let turn_id = request.turn_id;
        info!(turn_id, thread_id = %request.config.thread_id, "turn started");

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let mut execute_tool = |call: &ToolCall| self.execute_tool(call, &cancel);
            let mut emit = |event: AgentEvent| self.apply_agent_event(event, &cancel);
            self.runtime
                .run_turn(request, Arc::clone(&cancel), &mut execute_tool, &mut emit)
        }));

        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(error)) => Some(error),
            Err(_) => Some("Agent runtime panicked".to_string()),
        };

        self.finish_turn(turn_id, failure);
    }

    fn finish_turn(&self, turn_id: TurnId, failure: Option<String>) {
        let mut active = self.lock_active();
        let is_current = active
            .as_ref()
            .is_some_and(|work| work.id == turn_id && work.kind == WorkKind::Turn);
        if !is_current {
            debug!(turn_id, "detached turn worker finished");
            return;
        }

        if let Some(failure) = &failure {
            warn!(turn_id, error = %failure, "turn failed");
            self.append_error(failure);
        }

        let session_id = self.save_history();

        if let Some(mut completed) = active.take() {
            if let Some(join_handle) = completed.join_handle.take() {
                let is_current_thread = join_handle.thread().id() == thread::current().id();
                if !is_current_thread && join_handle.is_finished() {
                    let _ = join_handle.join();
                }
            }
        }

        self.sink.emit(UiEvent::Generating { active: false });
        info!(turn_id, session_id = ?session_id, "turn finished");
    }

    fn apply_agent_event(&self, event: AgentEvent, cancel: &CancelSignal) {
        let shell_requests = {
            let mut conversation = self.lock_conversation();
            if cancel.load(Ordering::SeqCst) {
                return;
            }

            let mut shell_requests = Vec::new();
            for update in conversation.assembler.push(event) {
                match update {
                    ChatUpdate::Started { ui_id, message } => {
                        self.sink.emit(UiEvent::AppendMessage { ui_id, message });
                    }
                    ChatUpdate::Streamed { ui_id, message } => {
                        self.sink.emit(UiEvent::UpdateMessage { ui_id, message });
                    }
                    ChatUpdate::Finalized {
                        ui_id,
                        message,
                        replaced,
                    } => {
                        conversation.messages.push(message.clone());
                        let routed = match message.role {
                            Role::Assistant => {
                                let output = conversation.router.dispatch(&message);
                                for request in output.shell {
                                    if conversation.bash_calls.contains_key(&request.call_id) {
                                        debug!(call_id = %request.call_id, "bash call already executed");
                                        continue;
                                    }
                                    conversation.bash_calls.insert(request.call_id.clone(), None);
                                    shell_requests.push(request);
                                }
                                output.events
                            }
                            Role::Tool => conversation.router.dispatch_result(&message),
                            Role::Human => Vec::new(),
                        };

                        if replaced {
                            self.sink.emit(UiEvent::UpdateMessage { ui_id, message });
                        } else {
                            self.sink.emit(UiEvent::AppendMessage { ui_id, message });
                        }
                        for event in routed {
                            self.sink.emit(event);
                        }
                    }
                }
            }
            shell_requests
        };

        for request in shell_requests {
            if cancel.load(Ordering::SeqCst) {
                return;
            }

            let timeout = request.timeout.unwrap_or(self.options.command_timeout);
            let output = self.run_in_shell(&request.command, timeout);
            let mut conversation = self.lock_conversation();
            if !cancel.load(Ordering::SeqCst) {
                conversation.bash_calls.insert(request.call_id, Some(output));
            }
        }
    }

    fn execute_tool(&self, call: &ToolCall, cancel: &CancelSignal) -> Option<ToolOutput> {
        if cancel.load(Ordering::SeqCst) {
            return Some(ToolOutput::fail("Turn cancelled"));
        }

        let invocation = ToolInvocation::parse(call);
        debug!(tool = %call.name, call_id = %call.id, "executing tool call");
        match &invocation {
            ToolInvocation::Bash { command, .. } => {
                let previous = {
                    let mut conversation = self.lock_conversation();
                    let previous = conversation.bash_calls.get(&call.id).cloned();
                    if previous.is_none() {
                        conversation.bash_calls.insert(call.id.clone(), None);
                    }
                    previous
                };
                let output = match previous {
                    Some(Some(output)) => output,
                    Some(None) => format!("Error: Command for call {} is still running.", call.id),
                    None => {
                        let timeout = invocation.timeout().unwrap_or(self.options.command_timeout);
                        let output = self.run_in_shell(command, timeout);
                        let mut conversation = self.lock_conversation();
                        if !cancel.load(Ordering::SeqCst) {
                            conversation
                                .bash_calls
                                .insert(call.id.clone(), Some(output.clone()));
                        }
                        output
                    }
                };
                Some(shell_output(output))
            }
            ToolInvocation::Ls { .. } | ToolInvocation::Grep { .. } | ToolInvocation::Tree { .. } => {
                let command = invocation.shell_command()?;
                Some(shell_output(
                    self.run_in_shell(&command, self.options.command_timeout),
                ))
            }
            ToolInvocation::ReadFile { path } => Some(self.tools.read_file(path)),
            ToolInvocation::WriteFile { path, content } => {
                Some(self.tools.write_file(path, content))
            }
            ToolInvocation::EditFile {
                path,
                old_text,
                new_text,
            } => Some(self.tools.edit_file(path, old_text, new_text)),
            ToolInvocation::TodoWrite { todos } => {
                let mut conversation = self.lock_conversation();
                if cancel.load(Ordering::SeqCst) {
                    return Some(ToolOutput::fail("Turn cancelled"));
                }
                conversation.todos = todos.clone();
                Some(ToolOutput::ok(todo_reminder(&conversation.todos)))
            }
            ToolInvocation::Unknown { .. } => None,
        }
    }

    /// Runs `command` in the shell session, starting a new session first when
    /// the previous one died or could not be started.
    fn run_in_shell(&self, command: &str, timeout: Duration) -> String {
        let mut shell = lock_unpoisoned(&self.shell);

        let needs_spawn = shell.as_ref().map_or(true, |session| !session.is_alive());
        if needs_spawn {
            match ShellSession::spawn(&self.options.shell) {
                Ok(session) => {
                    warn!("started replacement shell session");
                    *shell = Some(session);
                }
                Err(error) => {
                    error!(%error, "failed to start shell session");
                    return format!("Error: Terminal session could not be started: {error}");
                }
            }
        }

        match shell.as_mut() {
            Some(session) => session.execute(command, timeout),
            None => "Error: Terminal session is not running.".to_string(),
        }
    }

    fn start_reset(self: &Arc<Self>, reset: Reset) {
        let mut active = self.lock_active();
        if active.is_some() {
            self.write_terminal(BUSY_MESSAGE);
            return;
        }

        let reset_id = self.next_work_id.fetch_add(1, Ordering::SeqCst);
        self.sink.emit(UiEvent::Generating { active: true });

        let controller = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("coding-agent-reset-{reset_id}"))
            .spawn(move || {
                let outcome = catch_unwind(AssertUnwindSafe(|| controller.run_reset(reset)));
                if outcome.is_err() {
                    controller.write_terminal("Error: session reset panicked");
                }
                controller.finish_reset(reset_id);
            });

        match spawned {
            Ok(join_handle) => {
                *active = Some(ActiveWork {
                    id: reset_id,
                    kind: WorkKind::Reset,
                    cancel: Arc::new(AtomicBool::new(false)),
                    join_handle: Some(join_handle),
                });
            }
            Err(error) => {
                drop(active);
                error!(%error, "failed to spawn reset worker");
                self.write_terminal(format!("Error: failed to start reset: {error}"));
                self.sink.emit(UiEvent::Generating { active: false });
            }
        }
    }

    fn run_reset(&self, reset: Reset) {
        self.save_history();

        match reset {
            Reset::Clear => {
                *self.lock_conversation() = Conversation::new(&self.options.project_root, &self.ids);
                let shell_result = self.reset_shell();

                let _conversation = self.lock_conversation();
                self.sink.emit(UiEvent::ClearAll);
                self.emit_greeting();
                if let Err(error) = shell_result {
                    self.sink
                        .emit(UiEvent::write_terminal(format!("Error: {error}")));
                }
                self.sink
                    .emit(UiEvent::write_terminal("Conversation cleared and saved."));
                info!("conversation cleared");
            }
            Reset::Resume(session_id) => {
                let record = match self.store.load_record(&session_id) {
                    Ok(record) => record,
                    Err(error) => {
                        warn!(%error, session_id, "failed to resume session");
                        self.write_terminal(format!("Error resuming session: {error}"));
                        return;
                    }
                };

                if let Some(index) = first_unmatched_tool_result(&record.messages) {
                    warn!(session_id, index, "resumed history has an orphan tool result");
                    self.write_terminal(format!(
                        "Error resuming session: message {index} is a tool result without a matching tool call"
                    ));
                    return;
                }

                let stored_id = Some(record.session_id.clone())
                    .filter(|id| is_valid_session_id(id));
                let thread_id = stored_id.clone().unwrap_or_else(|| session_id.clone());
                let seed_config = TurnConfig {
                    thread_id: thread_id.clone(),
                    recursion_limit: self.options.recursion_limit,
                };
                if let Err(error) = self
                    .runtime
                    .seed_history(&seed_config, record.messages.clone())
                {
                    warn!(%error, session_id, "runtime rejected resumed history");
                    self.write_terminal(format!("Error resuming session: {error}"));
                    return;
                }

                {
                    let mut conversation = self.lock_conversation();
                    *conversation = Conversation::new(&self.options.project_root, &self.ids);
                    conversation.thread_id = thread_id;
                    conversation.session_id = stored_id;
                    conversation.messages = record.messages;
                }
                let shell_result = self.reset_shell();

                let conversation = self.lock_conversation();
                self.sink.emit(UiEvent::ClearAll);
                for message in &conversation.messages {
                    self.sink.emit(UiEvent::AppendMessage {
                        ui_id: self.ids.next_id(),
                        message: message.clone(),
                    });
                }
                if let Err(error) = shell_result {
                    self.sink
                        .emit(UiEvent::write_terminal(format!("Error: {error}")));
                }
                self.sink.emit(UiEvent::write_terminal(format!(
                    "Resumed session: {session_id}"
                )));
                info!(session_id, messages = conversation.messages.len(), "session resumed");
            }
        }
    }

    fn finish_reset(&self, reset_id: u64) {
        let mut active = self.lock_active();
        let is_current = active
            .as_ref()
            .is_some_and(|work| work.id == reset_id && work.kind == WorkKind::Reset);
        if is_current {
            active.take();
            self.sink.emit(UiEvent::Generating { active: false });
        }
    }

    /// Tears the shell session down completely before starting its replacement.
    fn reset_shell(&self) -> Result<(), ShellError> {
        let mut shell = lock_unpoisoned(&self.shell);
        close_shell(&mut shell);
        *shell = Some(ShellSession::spawn(&self.options.shell)?);
        Ok(())
    }

    fn append_error(&self, error: &str) {
        let mut conversation = self.lock_conversation();
        let message = Message::assistant(format!("Error: {error}"));
        conversation.messages.push(message.clone());
        conversation.assembler.reset();
        self.sink.emit(UiEvent::AppendMessage {
            ui_id: self.ids.next_id(),
            message,
        });
    }

    fn emit_greeting(&self) {
        self.sink.emit(UiEvent::AppendMessage {
            ui_id: self.ids.next_id(),
            message: Message::assistant(GREETING),
        });
    }

    fn write_terminal(&self, text: impl Into<String>) {
        self.sink.emit(UiEvent::write_terminal(text));
    }

    fn lock_conversation(&self) -> MutexGuard<'_, Conversation> {
        lock_unpoisoned(&self.conversation)
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveWork>> {
        lock_unpoisoned(&self.active)
    }
}

fn close_shell(shell: &mut Option<ShellSession>) {
    if let Some(mut session) = shell.take() {
        session.close();
    }
}

fn shell_output(output: String) -> ToolOutput {
    if output.starts_with("Error:") {
        ToolOutput::fail(output)
    } else {
        ToolOutput::ok(output)
    }
}

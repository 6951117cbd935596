mod support;

use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use agent_runtime::{
    AgentEvent, AgentRuntime, CancelSignal, Message, Role, RuntimeProfile, ToolCall, ToolOutput,
    TurnRequest,
};
use agent_runtime_mock::{MockRuntime, ScriptStep};
use coding_agent::commands::HELP_TEXT;
use coding_agent::controller::{
    ControllerOptions, ConversationController, BUSY_MESSAGE, GREETING,
};
use coding_agent::ui::{RecordingSink, Surface, UiEvent, UiSink};
use pretty_assertions::assert_eq;
use serde_json::json;
use session_store::SessionStore;
use support::{roles, wait_until, Harness, IDLE_TIMEOUT};
use tempfile::tempdir;

fn slow_runtime() -> MockRuntime {
    MockRuntime::with_token_delay(Duration::from_millis(150))
}

/// Executes its bash call before reporting the assistant message carrying it.
struct ExecuteFirstRuntime;

impl AgentRuntime for ExecuteFirstRuntime {
    fn profile(&self) -> RuntimeProfile {
        RuntimeProfile {
            runtime_id: "execute-first".to_string(),
            model_id: "execute-first".to_string(),
        }
    }

    fn run_turn(
        &self,
        _req: TurnRequest,
        _cancel: CancelSignal,
        execute_tool: &mut dyn FnMut(&ToolCall) -> Option<ToolOutput>,
        emit: &mut dyn FnMut(AgentEvent),
    ) -> Result<(), String> {
        let call = ToolCall::new("c1", "bash", json!({ "command": "echo x >> count.txt" }));
        let output = execute_tool(&call).ok_or_else(|| "bash was not executed".to_string())?;

        emit(AgentEvent::Update {
            node: "model".to_string(),
            messages: vec![Message::assistant_with_tool_calls("", vec![call])],
        });
        emit(AgentEvent::Update {
            node: "tools".to_string(),
            messages: vec![Message::tool_result(
                "c1",
                "bash",
                format!("```\n{}\n```", output.content),
            )],
        });
        emit(AgentEvent::Update {
            node: "model".to_string(),
            messages: vec![Message::assistant("done")],
        });
        Ok(())
    }
}

#[test]
fn start_greets_the_user() {
    let harness = Harness::new();
    harness.controller.start();

    assert_eq!(harness.chat_texts(), vec![GREETING.to_string()]);
    assert!(harness.controller.messages().is_empty());
}

#[test]
fn plain_turn_streams_reply_and_saves_the_session() {
    let harness = Harness::new();
    harness.run("hello");

    let messages = harness.controller.messages();
    assert_eq!(roles(&messages), vec![Role::Human, Role::Assistant]);
    assert_eq!(messages[1].text(), "You said: hello");

    let chat = harness.chat_texts();
    assert_eq!(chat.first().map(String::as_str), Some("hello"));
    assert_eq!(chat.last().map(String::as_str), Some("You said: hello"));

    let events = harness.sink.events();
    assert_eq!(
        events.first(),
        Some(&UiEvent::AppendMessage {
            ui_id: 1,
            message: messages[0].clone(),
        })
    );
    assert_eq!(events.last(), Some(&UiEvent::Generating { active: false }));

    let session_id = harness
        .controller
        .session_id()
        .expect("turn should save the session");
    let saved = harness.store.load(&session_id).expect("saved session");
    assert_eq!(saved, messages);
}

#[test]
fn follow_up_turns_reuse_the_session_and_runtime_thread() {
    let harness = Harness::new();
    harness.run("one");
    let first_id = harness.controller.session_id();
    harness.run("two");

    assert_eq!(harness.controller.session_id(), first_id);
    assert_eq!(harness.controller.messages().len(), 4);

    let requests = harness.runtime.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].config.thread_id, requests[1].config.thread_id);
    assert_eq!(requests[1].messages.len(), 1);
    assert_eq!(requests[1].config.recursion_limit, 200);

    let listed = harness
        .store
        .list(Some(harness.controller.project_root()))
        .expect("list sessions");
    assert_eq!(listed.len(), 1);
}

#[test]
fn bang_command_runs_once_in_the_shell_and_reaches_the_terminal() {
    let harness = Harness::new();
    harness.run("!echo hi");

    let lines = harness.terminal_lines();
    assert!(lines.contains(&"$ echo hi".to_string()), "{lines:?}");
    assert_eq!(lines.iter().filter(|line| *line == "hi").count(), 1, "{lines:?}");

    let messages = harness.controller.messages();
    assert_eq!(
        roles(&messages),
        vec![Role::Human, Role::Assistant, Role::Tool, Role::Assistant]
    );
    assert_eq!(messages[1].tool_calls[0].name, "bash");
    assert_eq!(messages[2].text(), "```\nhi\n```");
    assert!(harness.sink.events().contains(&UiEvent::Focus {
        surface: Surface::Terminal
    }));
}

#[test]
fn bash_call_executed_before_its_message_is_reported_runs_once() {
    let workspace = tempdir().expect("workspace tempdir");
    let history = tempdir().expect("history tempdir");
    let sink = Arc::new(RecordingSink::default());
    let controller = ConversationController::new(
        Arc::new(ExecuteFirstRuntime),
        SessionStore::new(history.path()).expect("session store"),
        Arc::clone(&sink) as Arc<dyn UiSink>,
        ControllerOptions::new(workspace.path()),
    )
    .expect("controller should start");

    controller.submit("count");
    assert!(controller.wait_idle(IDLE_TIMEOUT));

    assert_eq!(
        fs::read_to_string(workspace.path().join("count.txt")).expect("count file"),
        "x\n"
    );
    assert_eq!(
        roles(&controller.messages()),
        vec![Role::Human, Role::Assistant, Role::Tool, Role::Assistant]
    );
}

#[test]
fn shell_is_restarted_in_the_project_root_after_it_exits() {
    let harness = Harness::new();
    fs::create_dir(harness.workspace.path().join("nested")).expect("create nested dir");
    harness.run("!cd nested");

    harness.run("!exit");
    let after_exit = harness.terminal_lines();
    assert!(
        after_exit
            .iter()
            .any(|line| line == "Error: Terminal session ended unexpectedly. Current output:"),
        "{after_exit:?}"
    );

    harness.run("!echo back");
    let lines = harness.terminal_lines();
    assert_eq!(lines[lines.len() - 2..].to_vec(), vec!["$ echo back", "back"]);

    harness.run("!pwd");
    let pwd = harness
        .controller
        .messages()
        .iter()
        .rev()
        .find(|message| message.role == Role::Tool)
        .map(|message| message.text().into_owned())
        .expect("pwd result");
    let root = harness.controller.project_root().display().to_string();
    assert_eq!(pwd, format!("```\n{root}\n```"));
}

#[test]
fn shell_state_persists_between_turns() {
    let harness = Harness::new();
    fs::create_dir(harness.workspace.path().join("nested")).expect("create nested dir");

    harness.run("!cd nested");
    harness.run("!pwd");

    let messages = harness.controller.messages();
    let pwd_output = messages
        .iter()
        .rev()
        .find(|message| message.role == Role::Tool)
        .map(|message| message.text().into_owned())
        .expect("pwd result");
    assert!(pwd_output.contains("/nested"), "{pwd_output}");
}

#[test]
fn listing_tools_run_their_command_line_in_the_shell() {
    let harness = Harness::new();
    fs::write(harness.workspace.path().join("marker.txt"), "x").expect("write marker");
    harness.runtime.push_turn(vec![ScriptStep::CallTools {
        text: "Listing".to_string(),
        calls: vec![ToolCall::new("ls-1", "ls", json!({}))],
    }]);

    harness.run("list files");

    let lines = harness.terminal_lines();
    assert_eq!(lines.first().map(String::as_str), Some("ls -la ."));
    assert!(lines.iter().any(|line| line.ends_with("marker.txt")), "{lines:?}");
}

#[test]
fn file_tools_write_inside_the_workspace_and_open_the_editor() {
    let harness = Harness::new();
    harness.runtime.push_turn(vec![
        ScriptStep::CallTools {
            text: "Writing".to_string(),
            calls: vec![ToolCall::new(
                "w1",
                "write_file",
                json!({ "path": "notes/a.txt", "content": "alpha" }),
            )],
        },
        ScriptStep::CallTools {
            text: "Editing".to_string(),
            calls: vec![ToolCall::new(
                "e1",
                "edit_file",
                json!({ "path": "notes/a.txt", "old_text": "alpha", "new_text": "beta" }),
            )],
        },
    ]);

    harness.run("make a note");

    let target = harness.controller.project_root().join("notes/a.txt");
    assert_eq!(fs::read_to_string(&target).expect("written file"), "beta");

    let opens = harness
        .sink
        .events()
        .into_iter()
        .filter_map(|event| match event {
            UiEvent::OpenFile { path, content, .. } => Some((path, content)),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(
        opens,
        vec![
            (target.clone(), Some("alpha".to_string())),
            (target.clone(), None),
            (target.clone(), None),
            (target, None),
        ]
    );

    let tool_texts = harness
        .controller
        .messages()
        .iter()
        .filter(|message| message.role == Role::Tool)
        .map(|message| message.text().into_owned())
        .collect::<Vec<_>>();
    assert_eq!(tool_texts, vec!["Wrote notes/a.txt", "Updated notes/a.txt"]);
}

#[test]
fn writes_outside_the_workspace_are_refused() {
    let harness = Harness::new();
    let outside = tempfile::tempdir().expect("outside dir");
    let target = outside.path().join("escape.txt");
    harness.runtime.push_turn(vec![ScriptStep::CallTools {
        text: String::new(),
        calls: vec![ToolCall::new(
            "w1",
            "write_file",
            json!({ "path": target.display().to_string(), "content": "x" }),
        )],
    }]);

    harness.run("escape");

    assert!(!target.exists());
    let messages = harness.controller.messages();
    let result = messages.last().expect("tool result");
    assert!(result.text().contains("escapes workspace root"), "{}", result.text());
}

#[test]
fn todo_write_replaces_the_list_and_returns_a_reminder() {
    let harness = Harness::new();
    harness.runtime.push_turn(vec![ScriptStep::CallTools {
        text: "Planning".to_string(),
        calls: vec![ToolCall::new(
            "t1",
            "todo_write",
            json!({ "todos": [
                { "id": 1, "title": "Read code", "status": "completed" },
                { "id": 2, "title": "Fix bug", "status": "in_progress" }
            ] }),
        )],
    }]);

    harness.run("plan it");

    let todos = harness.controller.todos();
    assert_eq!(todos.len(), 2);
    assert!(harness
        .sink
        .events()
        .contains(&UiEvent::SetTodos { todos: todos.clone() }));

    let reminder = harness
        .controller
        .messages()
        .last()
        .map(|message| message.text().into_owned())
        .expect("tool result");
    assert!(reminder.starts_with("--- TASK STATUS ---"), "{reminder}");
    assert!(reminder.contains("#2 Fix bug"), "{reminder}");
}

#[test]
fn failed_turn_appends_an_error_message() {
    let harness = Harness::new();
    harness
        .runtime
        .push_turn(vec![ScriptStep::Fail("model overloaded".to_string())]);

    harness.run("go");

    let messages = harness.controller.messages();
    assert_eq!(
        messages.last().map(|message| message.text().into_owned()),
        Some("Error: model overloaded".to_string())
    );
    assert!(harness.controller.session_id().is_some());
    assert!(!harness.controller.is_busy());
}

#[test]
fn input_is_rejected_while_a_turn_runs() {
    let harness = Harness::with_runtime(slow_runtime());
    harness.controller.submit("first");
    harness.controller.submit("second");
    harness.wait_idle();

    assert!(harness.terminal_lines().contains(&BUSY_MESSAGE.to_string()));
    let humans = harness
        .controller
        .messages()
        .into_iter()
        .filter(|message| message.role == Role::Human)
        .count();
    assert_eq!(humans, 1);
}

#[test]
fn help_is_available_while_busy() {
    let harness = Harness::with_runtime(slow_runtime());
    harness.controller.submit("first");
    harness.controller.submit("/help");

    assert!(harness.sink.terminal_text().contains(HELP_TEXT));
    harness.wait_idle();
}

#[test]
fn cancel_stops_the_turn_and_discards_its_output() {
    let harness = Harness::with_runtime(slow_runtime());
    harness.controller.submit("hello there friend");
    harness.controller.submit("/cancel");

    assert!(!harness.controller.is_busy());
    assert!(harness.terminal_lines().contains(&"Turn cancelled".to_string()));

    // Give the detached worker time to notice the flag and stop.
    thread::sleep(Duration::from_millis(800));
    assert_eq!(roles(&harness.controller.messages()), vec![Role::Human]);

    harness.controller.submit("/cancel");
    assert!(harness.terminal_lines().contains(&"No active turn".to_string()));

    harness.run("again");
    assert_eq!(
        harness.controller.messages().last().map(|m| m.text().into_owned()),
        Some("You said: again".to_string())
    );
}

#[test]
fn unknown_commands_are_reported() {
    let harness = Harness::new();
    harness.controller.submit("/frobnicate");

    assert_eq!(harness.terminal_lines(), vec!["Unknown command: /frobnicate"]);
}

#[test]
fn clear_saves_and_starts_a_fresh_conversation() {
    let harness = Harness::new();
    harness.run("hello");
    let old_thread = harness.controller.thread_id();
    let old_session = harness.controller.session_id().expect("saved session");
    harness.sink.take();

    harness.run("/clear");

    assert!(harness.controller.messages().is_empty());
    assert_eq!(harness.controller.session_id(), None);
    assert_ne!(harness.controller.thread_id(), old_thread);
    assert!(harness.store.load(&old_session).is_ok());

    let events = harness.sink.events();
    let clear_at = events
        .iter()
        .position(|event| *event == UiEvent::ClearAll)
        .expect("clear event");
    assert!(matches!(
        &events[clear_at + 1],
        UiEvent::AppendMessage { message, .. } if message.text() == GREETING
    ));
    assert!(harness
        .terminal_lines()
        .contains(&"Conversation cleared and saved.".to_string()));

    harness.run("!pwd");
    let pwd = harness
        .controller
        .messages()
        .iter()
        .find(|message| message.role == Role::Tool)
        .map(|message| message.text().into_owned())
        .expect("pwd result");
    assert!(
        pwd.contains(&harness.controller.project_root().display().to_string()),
        "{pwd}"
    );
}

#[test]
fn resume_without_sessions_says_so() {
    let harness = Harness::new();
    harness.controller.submit("/resume");

    assert_eq!(
        harness.terminal_lines(),
        vec!["Available sessions:", "- No sessions found."]
    );
}

#[test]
fn resume_lists_and_restores_a_saved_session() {
    let harness = Harness::new();
    harness.run("hello");
    let session_id = harness.controller.session_id().expect("saved session");
    harness.run("/clear");
    harness.sink.take();

    harness.controller.submit("/resume");
    let listing = harness.terminal_lines();
    assert_eq!(listing[0], "Available sessions:");
    assert!(
        listing[1].starts_with(&format!("[0] {session_id} - hello (")),
        "{listing:?}"
    );
    assert_eq!(listing[2], "Use /resume <index> to load a session.");
    harness.sink.take();

    harness.run("/resume 0");

    let messages = harness.controller.messages();
    assert_eq!(roles(&messages), vec![Role::Human, Role::Assistant]);
    assert_eq!(harness.controller.session_id(), Some(session_id.clone()));
    assert_eq!(harness.controller.thread_id(), session_id);
    assert_eq!(harness.runtime.thread_history(&session_id), messages);

    let events = harness.sink.events();
    assert!(events.contains(&UiEvent::ClearAll));
    assert_eq!(
        harness.chat_texts(),
        vec!["hello".to_string(), "You said: hello".to_string()]
    );
    assert!(harness
        .terminal_lines()
        .contains(&format!("Resumed session: {session_id}")));

    harness.run("next");
    assert_eq!(harness.controller.session_id(), Some(session_id.clone()));
    assert_eq!(harness.store.load(&session_id).expect("reload").len(), 4);
}

#[test]
fn resume_reports_bad_index_and_unknown_id() {
    let harness = Harness::new();

    harness.controller.submit("/resume 5");
    harness.run("/resume missing-id");

    assert_eq!(
        harness.terminal_lines(),
        vec![
            "Invalid session index: 5",
            "Error resuming session: Session missing-id not found",
        ]
    );
}

#[test]
fn resume_rejects_history_with_an_orphan_tool_result() {
    let harness = Harness::new();
    let orphaned = vec![
        Message::human("hi"),
        Message::tool_result("missing", "bash", "```\nx\n```"),
    ];
    let session_id = harness
        .store
        .save(&orphaned, None, Some(harness.controller.project_root()))
        .expect("save session");

    harness.run(&format!("/resume {session_id}"));

    assert_eq!(
        harness.terminal_lines(),
        vec!["Error resuming session: message 1 is a tool result without a matching tool call"]
    );
    assert!(harness.controller.messages().is_empty());
    assert_eq!(harness.controller.session_id(), None);
}

#[test]
fn quit_saves_and_emits_exit_once() {
    let harness = Harness::new();
    harness.run("bye soon");

    harness.controller.submit("/quit");
    harness.controller.quit();

    assert!(harness.controller.has_exited());
    let exits = harness
        .sink
        .events()
        .into_iter()
        .filter(|event| *event == UiEvent::Exit)
        .count();
    assert_eq!(exits, 1);

    let session_id = harness.controller.session_id().expect("saved session");
    assert_eq!(harness.store.load(&session_id).expect("saved").len(), 2);
}

#[test]
fn quit_during_a_turn_cancels_it() {
    let harness = Harness::with_runtime(slow_runtime());
    harness.controller.submit("a long request");
    harness.controller.submit("/exit");

    assert!(harness.controller.has_exited());
    assert!(!harness.controller.is_busy());
    assert!(wait_until(IDLE_TIMEOUT, || harness
        .sink
        .events()
        .contains(&UiEvent::Exit)));
}

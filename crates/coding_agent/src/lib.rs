//! Terminal coding agent host.
//!
//! The [`controller::ConversationController`] drives one conversation against an
//! [`agent_runtime::AgentRuntime`]: it assembles streamed output into chat
//! messages, routes finalized tool calls to the terminal, editor and todo
//! surfaces, runs commands in a persistent shell session and saves the history
//! after every turn.
//!
//! ## Runtime selection
//!
//! `CODING_AGENT_RUNTIME` picks the runtime at startup. Only `mock` is built in
//! and it is the default.
//!
//! ## Configuration
//!
//! See [`config`] for the optional JSON config file and environment overrides.
//! Logs go to a file (see [`logging`]); stdout is reserved for the console.

use std::sync::{Mutex, MutexGuard};

pub mod commands;
pub mod config;
pub mod console;
pub mod controller;
pub mod invocation;
pub mod logging;
pub mod router;
pub mod runtimes;
pub mod stream;
pub mod todos;
pub mod tools;
pub mod ui;

pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

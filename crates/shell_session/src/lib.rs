//! Persistent interactive shell driven through a pseudo-terminal.
//!
//! A [`ShellSession`] keeps one shell process alive for the lifetime of a
//! conversation so that directory changes and exported variables carry over
//! between commands. Command completion is detected with a per-session random
//! prompt sentinel; captured output is cleaned of echo and terminal escapes.

mod error;
mod output;
mod session;

pub use error::ShellError;
pub use output::{clean_output, shell_quote, strip_ansi, strip_echo, wrap_command};
pub use session::{ShellConfig, ShellSession, ShellState, DEFAULT_COMMAND_TIMEOUT};

use std::io::{ErrorKind, Read, Write};
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::ShellError;
use crate::output::{clean_output, shell_quote, strip_ansi, wrap_command};

/// Default per-command timeout.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(5);
const EXIT_GRACE: Duration = Duration::from_millis(500);
const EXIT_POLL: Duration = Duration::from_millis(10);
const READ_CHUNK_SIZE: usize = 4096;
const PTY_ROWS: u16 = 24;
const PTY_COLS: u16 = 200;

/// Launch parameters for a [`ShellSession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellConfig {
    pub program: String,
    pub args: Vec<String>,
    /// Bound on each startup handshake step.
    pub ready_timeout: Duration,
    /// Directory entered with `cd` once the prompt is installed.
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            program: "/bin/bash".to_string(),
            args: ["--norc", "--noprofile", "--noediting", "-i"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            ready_timeout: DEFAULT_READY_TIMEOUT,
            cwd: None,
            env: Vec::new(),
        }
    }
}

/// Lifecycle state of a [`ShellSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellState {
    /// Idle at the sentinel prompt.
    Ready,
    /// A previous command timed out; its completion prompt is still owed.
    Busy,
    /// The shell stream ended unexpectedly.
    Dead,
    /// Torn down through [`ShellSession::close`].
    Closed,
}

enum WaitOutcome {
    Prompt(String),
    TimedOut(String),
    Eof(String),
}

/// One persistent interactive shell attached to a pseudo-terminal.
pub struct ShellSession {
    sentinel: String,
    writer: Option<Box<dyn Write + Send>>,
    master: Option<Box<dyn MasterPty + Send>>,
    child: Box<dyn Child + Send + Sync>,
    output_rx: Receiver<Vec<u8>>,
    reader: Option<JoinHandle<()>>,
    buffer: String,
    undecoded: Vec<u8>,
    state: ShellState,
}

impl std::fmt::Debug for ShellSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellSession")
            .field("sentinel", &self.sentinel)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl ShellSession {
    /// Spawns the shell, installs the sentinel prompt and enters `config.cwd`.
    ///
    /// Failing to observe the sentinel within `config.ready_timeout` is fatal.
    pub fn spawn(config: &ShellConfig) -> Result<Self, ShellError> {
        let sentinel = format!(
            "__CODING_AGENT_PROMPT_{}__",
            &Uuid::new_v4().simple().to_string()[..12]
        );

        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: PTY_ROWS,
                cols: PTY_COLS,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|error| ShellError::pty("opening pseudo-terminal", error))?;

        let mut command = CommandBuilder::new(&config.program);
        command.args(&config.args);
        if let Ok(current_dir) = std::env::current_dir() {
            command.cwd(current_dir);
        }
        command.env("TERM", "dumb");
        for (key, value) in &config.env {
            command.env(key, value);
        }

        let mut child = pair
            .slave
            .spawn_command(command)
            .map_err(|error| ShellError::pty("spawning shell", error))?;
        drop(pair.slave);

        let reader = match pair.master.try_clone_reader() {
            Ok(reader) => reader,
            Err(error) => {
                terminate_child(&mut child);
                return Err(ShellError::pty("cloning pseudo-terminal reader", error));
            }
        };

        let writer = match pair.master.take_writer() {
            Ok(writer) => writer,
            Err(error) => {
                terminate_child(&mut child);
                return Err(ShellError::pty("taking pseudo-terminal writer", error));
            }
        };

        let (output_tx, output_rx) = mpsc::channel();
        let reader = match thread::Builder::new()
            .name("shell-session-reader".to_string())
            .spawn(move || read_loop(reader, output_tx))
        {
            Ok(handle) => handle,
            Err(error) => {
                terminate_child(&mut child);
                return Err(ShellError::io("spawning shell reader thread", error));
            }
        };

        info!(
            program = %config.program,
            pid = child.process_id().unwrap_or(0),
            "spawned shell session"
        );

        let mut session = Self {
            sentinel,
            writer: Some(writer),
            master: Some(pair.master),
            child,
            output_rx,
            reader: Some(reader),
            buffer: String::new(),
            undecoded: Vec::new(),
            state: ShellState::Ready,
        };

        session.install_prompt(config.ready_timeout)?;

        if let Some(cwd) = &config.cwd {
            let output = session.execute(
                &format!("cd {}", shell_quote(&cwd.to_string_lossy())),
                config.ready_timeout,
            );
            if !output.is_empty() {
                return Err(ShellError::InitialDirectory {
                    path: cwd.clone(),
                    output,
                });
            }
        }

        Ok(session)
    }

    /// Runs `command` in the session and returns its cleaned output.
    ///
    /// Never fails: timeouts and a vanished shell are reported as text starting
    /// with `Error:`. A timed-out command keeps running; the next call first
    /// waits for its completion before sending anything new.
    pub fn execute(&mut self, command: &str, timeout: Duration) -> String {
        let command = command.trim();
        if command.is_empty() {
            return String::new();
        }

        match self.state {
            ShellState::Ready => {}
            ShellState::Busy => {
                if let Some(error) = self.drain_stale_prompt(timeout) {
                    return error;
                }
            }
            ShellState::Dead | ShellState::Closed => {
                return "Error: Terminal session is not running.".to_string();
            }
        }

        let wrapped = wrap_command(command);
        if let Err(error) = self.send_line(&wrapped) {
            self.state = ShellState::Dead;
            error!(%error, "failed to write command to shell");
            return format!("Error: Failed to send command to terminal session: {error}");
        }

        debug!(command, "executing shell command");
        match self.wait_for_prompt(timeout) {
            WaitOutcome::Prompt(raw) => clean_output(&raw, &wrapped, command),
            WaitOutcome::TimedOut(partial) => {
                self.state = ShellState::Busy;
                warn!(command, timeout = ?timeout, "shell command timed out");
                format!(
                    "Error: Command timed out after {}. Current output:\n{}",
                    describe_duration(timeout),
                    clean_output(&partial, &wrapped, command)
                )
            }
            WaitOutcome::Eof(partial) => {
                self.state = ShellState::Dead;
                error!(command, "shell session ended unexpectedly");
                format!(
                    "Error: Terminal session ended unexpectedly. Current output:\n{}",
                    clean_output(&partial, &wrapped, command)
                )
            }
        }
    }

    /// Returns the shell's current working directory as reported by `pwd`.
    pub fn getcwd(&mut self) -> String {
        self.execute("pwd", DEFAULT_COMMAND_TIMEOUT).trim().to_string()
    }

    #[must_use]
    pub fn state(&self) -> ShellState {
        self.state
    }

    /// Returns true while the session can accept commands.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        matches!(self.state, ShellState::Ready | ShellState::Busy)
    }

    /// Prompt marker used to detect command completion.
    #[must_use]
    pub fn sentinel(&self) -> &str {
        &self.sentinel
    }

    /// Asks the shell to exit and releases the pseudo-terminal. Idempotent.
    pub fn close(&mut self) {
        if self.state == ShellState::Closed {
            return;
        }

        if let Some(mut writer) = self.writer.take() {
            let _ = writer.write_all(b"exit\n");
            let _ = writer.flush();
        }

        let deadline = Instant::now() + EXIT_GRACE;
        loop {
            match self.child.try_wait() {
                Ok(Some(_)) => break,
                Ok(None) if Instant::now() < deadline => thread::sleep(EXIT_POLL),
                _ => {
                    terminate_child(&mut self.child);
                    break;
                }
            }
        }

        self.master.take();
        if let Some(reader) = self.reader.take() {
            if reader.is_finished() {
                let _ = reader.join();
            }
        }

        self.state = ShellState::Closed;
        info!("closed shell session");
    }

    fn install_prompt(&mut self, ready_timeout: Duration) -> Result<(), ShellError> {
        let init = format!(
            "stty -echo 2>/dev/null; PS1='\\n{}'; PS2=''; unset PROMPT_COMMAND",
            self.sentinel
        );
        self.send_line(&init)
            .map_err(|source| ShellError::io("installing sentinel prompt", source))?;

        match self.wait_for_prompt(ready_timeout) {
            WaitOutcome::Prompt(_) => {
                debug!(sentinel = %self.sentinel, "shell session ready");
                Ok(())
            }
            WaitOutcome::TimedOut(output) => Err(ShellError::NotReady {
                timeout: ready_timeout,
                output: strip_ansi(&output),
            }),
            WaitOutcome::Eof(output) => {
                self.state = ShellState::Dead;
                Err(ShellError::ExitedDuringStartup {
                    output: strip_ansi(&output),
                })
            }
        }
    }

    fn drain_stale_prompt(&mut self, timeout: Duration) -> Option<String> {
        match self.wait_for_prompt(timeout) {
            WaitOutcome::Prompt(stale) => {
                debug!(bytes = stale.len(), "discarded output of timed-out command");
                self.state = ShellState::Ready;
                None
            }
            WaitOutcome::TimedOut(partial) => Some(format!(
                "Error: Terminal is still busy with a previous command that timed out. \
                 Try again once it finishes. Current output:\n{}",
                strip_ansi(&partial).trim_matches(|c| c == '\r' || c == '\n')
            )),
            WaitOutcome::Eof(partial) => {
                self.state = ShellState::Dead;
                Some(format!(
                    "Error: Terminal session ended unexpectedly. Current output:\n{}",
                    strip_ansi(&partial).trim_matches(|c| c == '\r' || c == '\n')
                ))
            }
        }
    }

    fn send_line(&mut self, line: &str) -> std::io::Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| std::io::Error::new(ErrorKind::BrokenPipe, "shell writer closed"))?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()
    }

    /// Blocks until the sentinel shows up at the start of a line.
    ///
    /// On success everything up to and including the sentinel is consumed. On
    /// timeout the buffer is left intact so a later wait can still find the
    /// prompt of the command that is still running.
    fn wait_for_prompt(&mut self, timeout: Duration) -> WaitOutcome {
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(index) = self.find_prompt() {
                let output = self.buffer[..index].to_string();
                self.buffer.drain(..index + self.sentinel.len());
                return WaitOutcome::Prompt(output);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return WaitOutcome::TimedOut(self.buffer.clone());
            }

            match self.output_rx.recv_timeout(remaining) {
                Ok(bytes) => {
                    self.undecoded.extend_from_slice(&bytes);
                    decode_utf8(&mut self.undecoded, &mut self.buffer);
                }
                Err(RecvTimeoutError::Timeout) => {
                    return WaitOutcome::TimedOut(self.buffer.clone());
                }
                Err(RecvTimeoutError::Disconnected) => {
                    if !self.undecoded.is_empty() {
                        self.buffer
                            .push_str(&String::from_utf8_lossy(&self.undecoded));
                        self.undecoded.clear();
                    }
                    return WaitOutcome::Eof(std::mem::take(&mut self.buffer));
                }
            }
        }
    }

    fn find_prompt(&self) -> Option<usize> {
        let bytes = self.buffer.as_bytes();
        self.buffer
            .match_indices(self.sentinel.as_str())
            .map(|(index, _)| index)
            .find(|&index| index > 0 && matches!(bytes[index - 1], b'\n' | b'\r'))
    }
}

impl Drop for ShellSession {
    fn drop(&mut self) {
        self.close();
    }
}

fn read_loop(mut reader: Box<dyn Read + Send>, output_tx: Sender<Vec<u8>>) {
    let mut buffer = [0_u8; READ_CHUNK_SIZE];
    loop {
        match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => {
                if output_tx.send(buffer[..read].to_vec()).is_err() {
                    break;
                }
            }
            Err(error) if error.kind() == ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
}

fn terminate_child(child: &mut Box<dyn Child + Send + Sync>) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Moves the decodable prefix of `pending` into `out`.
///
/// Invalid sequences become U+FFFD; an incomplete trailing sequence stays in
/// `pending` until more bytes arrive.
fn decode_utf8(pending: &mut Vec<u8>, out: &mut String) {
    loop {
        match std::str::from_utf8(pending) {
            Ok(text) => {
                out.push_str(text);
                pending.clear();
                return;
            }
            Err(error) => {
                let valid = error.valid_up_to();
                out.push_str(&String::from_utf8_lossy(&pending[..valid]));
                match error.error_len() {
                    Some(invalid) => {
                        out.push(char::REPLACEMENT_CHARACTER);
                        pending.drain(..valid + invalid);
                    }
                    None => {
                        pending.drain(..valid);
                        return;
                    }
                }
            }
        }
    }
}

fn describe_duration(duration: Duration) -> String {
    if duration.subsec_millis() == 0 {
        format!("{} seconds", duration.as_secs())
    } else {
        format!("{} ms", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_keeps_split_multibyte_sequence_for_next_chunk() {
        let bytes = "héllo".as_bytes();
        let mut pending = bytes[..2].to_vec();
        let mut out = String::new();

        decode_utf8(&mut pending, &mut out);
        assert_eq!(out, "h");
        assert_eq!(pending, vec![0xC3]);

        pending.extend_from_slice(&bytes[2..]);
        decode_utf8(&mut pending, &mut out);
        assert_eq!(out, "héllo");
        assert!(pending.is_empty());
    }

    #[test]
    fn decode_replaces_invalid_bytes() {
        let mut pending = vec![b'a', 0xFF, b'b'];
        let mut out = String::new();

        decode_utf8(&mut pending, &mut out);
        assert_eq!(out, "a\u{FFFD}b");
        assert!(pending.is_empty());
    }

    #[test]
    fn durations_are_described_in_whole_seconds_when_possible() {
        assert_eq!(describe_duration(Duration::from_secs(60)), "60 seconds");
        assert_eq!(describe_duration(Duration::from_millis(1500)), "1500 ms");
    }

    #[test]
    fn default_config_runs_bash_without_rc_files() {
        let config = ShellConfig::default();
        assert_eq!(config.program, "/bin/bash");
        assert!(config.args.iter().any(|arg| arg == "--norc"));
        assert_eq!(config.ready_timeout, Duration::from_secs(5));
    }
}

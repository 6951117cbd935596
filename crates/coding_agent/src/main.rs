use std::fs;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{mpsc, Arc};

use clap::Parser;
use coding_agent::config::AppConfig;
use coding_agent::console::{spawn_stdin_reader, ConsoleEvent, ConsoleRenderer};
use coding_agent::controller::{ControllerOptions, ConversationController};
use coding_agent::logging::{default_log_path, init_file_logging, resolve_filter};
use coding_agent::runtimes;
use coding_agent::ui::ChannelSink;
use session_store::SessionStore;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "coding_agent", version, about = "Terminal coding agent")]
struct Cli {
    /// Project directory the agent works in. Defaults to the current directory.
    project_root: Option<PathBuf>,

    /// JSON config file. Overrides CODING_AGENT_CONFIG.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Session to resume right after startup.
    #[arg(long, value_name = "SESSION_ID")]
    resume: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("Error: {error}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), String> {
    let project_root = resolve_project_root(cli.project_root)?;
    let config = AppConfig::load(cli.config.as_deref()).map_err(|error| error.to_string())?;

    let store = match &config.history_dir {
        Some(dir) => SessionStore::new(dir),
        None => SessionStore::open_default(),
    }
    .map_err(|error| error.to_string())?;

    let log_path = config
        .log_file
        .clone()
        .unwrap_or_else(|| default_log_path(store.root()));
    let directive = resolve_filter(config.log_filter.as_deref(), |name| {
        std::env::var(name).ok()
    });
    init_file_logging(&log_path, &directive).map_err(|error| error.to_string())?;
    info!(
        project_root = %project_root.display(),
        history_dir = %store.root().display(),
        runtime = %config.runtime_id,
        "configuration resolved"
    );

    let runtime = runtimes::runtime_for_id(&config.runtime_id)?;

    let (sender, receiver) = mpsc::channel();
    let sink = Arc::new(ChannelSink::new(sender.clone(), ConsoleEvent::Ui));
    let mut options = ControllerOptions::new(&project_root);
    options.shell = config.shell.clone();
    options.command_timeout = config.command_timeout;
    options.recursion_limit = config.recursion_limit;

    let controller = ConversationController::new(runtime, store, sink, options)
        .map_err(|error| error.to_string())?;
    controller.start();
    if let Some(session_id) = cli.resume {
        controller.submit(&format!("/resume {session_id}"));
    }

    spawn_stdin_reader(sender).map_err(|error| format!("failed to read stdin: {error}"))?;

    let stdout = io::stdout();
    let mut renderer = ConsoleRenderer::new(stdout.lock());
    for event in receiver {
        match event {
            ConsoleEvent::Input(line) => controller.submit(&line),
            ConsoleEvent::InputClosed => controller.quit(),
            ConsoleEvent::Ui(ui_event) => {
                let exit = renderer
                    .render(&ui_event)
                    .map_err(|error| format!("failed to write output: {error}"))?;
                if exit {
                    break;
                }
            }
        }
    }

    Ok(())
}

fn resolve_project_root(path: Option<PathBuf>) -> Result<PathBuf, String> {
    let path = match path {
        Some(path) => path,
        None => std::env::current_dir()
            .map_err(|error| format!("failed to read current directory: {error}"))?,
    };

    let canonical = fs::canonicalize(&path)
        .map_err(|error| format!("project root '{}' is not accessible: {error}", path.display()))?;
    if !canonical.is_dir() {
        return Err(format!(
            "project root '{}' is not a directory",
            path.display()
        ));
    }

    Ok(canonical)
}

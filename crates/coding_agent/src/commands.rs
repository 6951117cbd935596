#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeTarget {
    /// Position in the most recent listing.
    Index(usize),
    SessionId(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Help,
    Clear,
    /// `/resume` with no argument lists sessions.
    Resume(Option<ResumeTarget>),
    Cancel,
    Quit,
    Unknown(String),
}

pub const HELP_TEXT: &str = "\
Commands:
  /help              Show this help
  /clear             Save and clear the conversation
  /resume            List saved sessions for this project
  /resume <index|id> Resume a saved session
  /cancel            Cancel the running turn
  /exit, /quit       Save and exit";

pub fn parse_slash_command(input: &str) -> Option<SlashCommand> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let mut parts = trimmed.split_whitespace();
    let command = parts.next().unwrap_or(trimmed).to_lowercase();

    let parsed = match command.as_str() {
        "/help" => SlashCommand::Help,
        "/clear" => SlashCommand::Clear,
        "/resume" => SlashCommand::Resume(parts.next().map(|arg| match arg.parse::<usize>() {
            Ok(index) => ResumeTarget::Index(index),
            Err(_) => ResumeTarget::SessionId(arg.to_string()),
        })),
        "/cancel" => SlashCommand::Cancel,
        "/quit" | "/exit" => SlashCommand::Quit,
        _ => SlashCommand::Unknown(command),
    };

    Some(parsed)
}

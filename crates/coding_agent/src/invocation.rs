use std::time::Duration;

use agent_runtime::ToolCall;
use serde::Deserialize;
use serde_json::Value;
use shell_session::shell_quote;

use crate::todos::TodoItem;

pub const BASH_TOOL: &str = "bash";
pub const LS_TOOL: &str = "ls";
pub const GREP_TOOL: &str = "grep";
pub const TREE_TOOL: &str = "tree";
pub const READ_FILE_TOOL: &str = "read_file";
pub const WRITE_FILE_TOOL: &str = "write_file";
pub const EDIT_FILE_TOOL: &str = "edit_file";
pub const TODO_WRITE_TOOL: &str = "todo_write";

const DEFAULT_PATH: &str = ".";

/// A tool call with its arguments decoded for the tool it names.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolInvocation {
    Bash {
        command: String,
        timeout_sec: Option<u64>,
    },
    Ls {
        path: String,
    },
    Grep {
        pattern: String,
        path: String,
        glob: Option<String>,
        ignore_case: bool,
    },
    Tree {
        path: String,
        max_depth: Option<u32>,
    },
    ReadFile {
        path: String,
    },
    WriteFile {
        path: String,
        content: String,
    },
    EditFile {
        path: String,
        old_text: String,
        new_text: String,
    },
    TodoWrite {
        todos: Vec<TodoItem>,
    },
    /// Unknown tool name, or a known name whose arguments did not decode.
    Unknown {
        name: String,
        args: Value,
    },
}

#[derive(Deserialize)]
struct BashArgs {
    command: String,
    #[serde(default)]
    timeout_sec: Option<u64>,
}

#[derive(Deserialize)]
struct PathArgs {
    #[serde(default)]
    path: Option<String>,
}

#[derive(Deserialize)]
struct GrepArgs {
    pattern: String,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    glob: Option<String>,
    #[serde(default)]
    ignore_case: bool,
}

#[derive(Deserialize)]
struct TreeArgs {
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    max_depth: Option<u32>,
}

#[derive(Deserialize)]
struct FileArgs {
    path: String,
}

#[derive(Deserialize)]
struct WriteArgs {
    path: String,
    content: String,
}

#[derive(Deserialize)]
struct EditArgs {
    path: String,
    old_text: String,
    new_text: String,
}

#[derive(Deserialize)]
struct TodoArgs {
    todos: Vec<TodoItem>,
}

impl ToolInvocation {
    #[must_use]
    pub fn parse(call: &ToolCall) -> Self {
        let args = &call.args;
        let parsed = match call.name.as_str() {
            BASH_TOOL => decode::<BashArgs>(args).map(|args| Self::Bash {
                command: args.command,
                timeout_sec: args.timeout_sec,
            }),
            LS_TOOL => decode::<PathArgs>(args).map(|args| Self::Ls {
                path: path_or_default(args.path),
            }),
            GREP_TOOL => decode::<GrepArgs>(args).map(|args| Self::Grep {
                pattern: args.pattern,
                path: path_or_default(args.path),
                glob: args.glob.filter(|glob| !glob.is_empty()),
                ignore_case: args.ignore_case,
            }),
            TREE_TOOL => decode::<TreeArgs>(args).map(|args| Self::Tree {
                path: path_or_default(args.path),
                max_depth: args.max_depth,
            }),
            READ_FILE_TOOL => decode::<FileArgs>(args).map(|args| Self::ReadFile { path: args.path }),
            WRITE_FILE_TOOL => decode::<WriteArgs>(args).map(|args| Self::WriteFile {
                path: args.path,
                content: args.content,
            }),
            EDIT_FILE_TOOL => decode::<EditArgs>(args).map(|args| Self::EditFile {
                path: args.path,
                old_text: args.old_text,
                new_text: args.new_text,
            }),
            TODO_WRITE_TOOL => decode::<TodoArgs>(args).map(|args| Self::TodoWrite { todos: args.todos }),
            _ => None,
        };

        parsed.unwrap_or_else(|| Self::Unknown {
            name: call.name.clone(),
            args: args.clone(),
        })
    }

    /// True for tools whose work happens in the shell session.
    #[must_use]
    pub fn is_shell(&self) -> bool {
        matches!(
            self,
            Self::Bash { .. } | Self::Ls { .. } | Self::Grep { .. } | Self::Tree { .. }
        )
    }

    /// Command line sent to the shell session, for shell-class tools.
    #[must_use]
    pub fn shell_command(&self) -> Option<String> {
        match self {
            Self::Bash { command, .. } => Some(command.clone()),
            Self::Ls { path } => Some(format!("ls -la {}", shell_quote(path))),
            Self::Grep {
                pattern,
                path,
                glob,
                ignore_case,
            } => {
                let mut line = "grep -rn".to_string();
                if *ignore_case {
                    line.push_str(" -i");
                }
                if let Some(glob) = glob {
                    line.push_str(&format!(" --include={}", shell_quote(glob)));
                }
                line.push_str(&format!(
                    " {} {}",
                    single_quoted(pattern),
                    shell_quote(path)
                ));
                Some(line)
            }
            Self::Tree { path, max_depth } => Some(match max_depth {
                Some(depth) => format!("tree -L {depth} {}", shell_quote(path)),
                None => format!("tree {}", shell_quote(path)),
            }),
            _ => None,
        }
    }

    /// One-line summary shown on the terminal surface for shell-class tools.
    #[must_use]
    pub fn preview(&self) -> Option<String> {
        match self {
            Self::Bash { command, .. } => {
                let command = command.trim();
                let mut lines = command.lines();
                let first = lines.next().unwrap_or_default();
                if lines.next().is_some() {
                    Some(format!("$ {first} …"))
                } else {
                    Some(format!("$ {first}"))
                }
            }
            _ => self.shell_command(),
        }
    }

    /// Per-call timeout requested by the model, if any.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        match self {
            Self::Bash {
                timeout_sec: Some(seconds),
                ..
            } if *seconds > 0 => Some(Duration::from_secs(*seconds)),
            _ => None,
        }
    }
}

fn decode<T: for<'de> Deserialize<'de>>(args: &Value) -> Option<T> {
    T::deserialize(args).ok()
}

fn path_or_default(path: Option<String>) -> String {
    path.filter(|path| !path.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_PATH.to_string())
}

fn single_quoted(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::todos::TodoStatus;

    fn parse(name: &str, args: Value) -> ToolInvocation {
        ToolInvocation::parse(&ToolCall::new("call-1", name, args))
    }

    #[test]
    fn bash_preview_shows_first_line_only() {
        let single = parse("bash", json!({ "command": "cargo test" }));
        let multi = parse("bash", json!({ "command": "cd src\nls" }));

        assert_eq!(single.preview().as_deref(), Some("$ cargo test"));
        assert_eq!(multi.preview().as_deref(), Some("$ cd src …"));
        assert_eq!(multi.shell_command().as_deref(), Some("cd src\nls"));
    }

    #[test]
    fn grep_renders_synthetic_command_line() {
        let invocation = parse(
            "grep",
            json!({ "pattern": "fn main", "path": "src", "glob": "*.rs", "ignore_case": true }),
        );

        assert_eq!(
            invocation.preview().as_deref(),
            Some("grep -rn -i --include='*.rs' 'fn main' src")
        );
    }

    #[test]
    fn listing_tools_default_to_current_directory() {
        assert_eq!(
            parse("ls", json!({})).preview().as_deref(),
            Some("ls -la .")
        );
        assert_eq!(
            parse("tree", json!({ "max_depth": 2 })).preview().as_deref(),
            Some("tree -L 2 .")
        );
        assert_eq!(
            parse("grep", json!({ "pattern": "it's" })).preview().as_deref(),
            Some(r"grep -rn 'it'\''s' .")
        );
    }

    #[test]
    fn file_and_todo_tools_decode_their_arguments() {
        assert_eq!(
            parse("edit_file", json!({ "path": "a.txt", "old_text": "a", "new_text": "b" })),
            ToolInvocation::EditFile {
                path: "a.txt".to_string(),
                old_text: "a".to_string(),
                new_text: "b".to_string(),
            }
        );

        let todos = parse(
            "todo_write",
            json!({ "todos": [{ "id": 1, "title": "plan", "status": "in_progress" }] }),
        );
        assert_eq!(
            todos,
            ToolInvocation::TodoWrite {
                todos: vec![TodoItem {
                    id: "1".to_string(),
                    title: "plan".to_string(),
                    status: TodoStatus::InProgress,
                }],
            }
        );
        assert!(todos.preview().is_none());
    }

    #[test]
    fn malformed_or_unknown_calls_become_unknown() {
        let malformed = parse("read_file", json!({ "file": "a.txt" }));
        let unknown = parse("web_search", json!({ "query": "rust" }));

        assert_eq!(
            malformed,
            ToolInvocation::Unknown {
                name: "read_file".to_string(),
                args: json!({ "file": "a.txt" }),
            }
        );
        assert!(matches!(unknown, ToolInvocation::Unknown { ref name, .. } if name == "web_search"));
        assert!(!unknown.is_shell());
    }

    #[test]
    fn bash_timeout_is_optional_and_positive() {
        assert_eq!(
            parse("bash", json!({ "command": "sleep 1", "timeout_sec": 5 })).timeout(),
            Some(Duration::from_secs(5))
        );
        assert_eq!(
            parse("bash", json!({ "command": "sleep 1", "timeout_sec": 0 })).timeout(),
            None
        );
    }
}

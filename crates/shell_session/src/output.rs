use std::sync::OnceLock;

use regex::Regex;

fn ansi_escape_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        // OSC strings first (ESC ] ... BEL / ESC \), then CSI and two-byte escapes.
        Regex::new(r"\x1B\][^\x07\x1B]*(?:\x07|\x1B\\)|\x1B(?:[@-Z\\-_]|\[[0-?]*[ -/]*[@-~])")
            .expect("ANSI escape regex must compile")
    })
}

/// Wraps a command in a brace group so compound input, trailing comments and
/// multi-line blocks complete with exactly one prompt while still running in
/// the session's own shell process.
#[must_use]
pub fn wrap_command(command: &str) -> String {
    format!("{{\n{}\n}}", command.trim())
}

/// Removes terminal control sequences from `text`.
#[must_use]
pub fn strip_ansi(text: &str) -> String {
    ansi_escape_regex().replace_all(text, "").into_owned()
}

/// Drops an echoed copy of the submitted command from the front of `lines`.
///
/// The wrapped block is matched line by line first; when that fails a single
/// leading line equal to the raw command is dropped instead.
#[must_use]
pub fn strip_echo<'b, 'a>(lines: &'b [&'a str], wrapped: &str, command: &str) -> &'b [&'a str] {
    let wrapped_lines = wrapped.trim().lines().collect::<Vec<_>>();
    let block_echoed = !wrapped_lines.is_empty()
        && lines.len() >= wrapped_lines.len()
        && lines
            .iter()
            .zip(&wrapped_lines)
            .all(|(line, wrapped_line)| line.trim() == wrapped_line.trim());

    if block_echoed {
        return &lines[wrapped_lines.len()..];
    }

    if lines
        .first()
        .is_some_and(|first| first.trim() == command.trim())
    {
        return &lines[1..];
    }

    lines
}

/// Turns raw text captured before a prompt into the command's visible output.
///
/// Internal blank lines and indentation are preserved; only leading and
/// trailing line breaks are removed.
#[must_use]
pub fn clean_output(raw: &str, wrapped: &str, command: &str) -> String {
    let lines = raw.lines().collect::<Vec<_>>();
    let kept = strip_echo(&lines, wrapped, command).join("\n");

    strip_ansi(&kept)
        .trim_matches(|c| c == '\r' || c == '\n')
        .to_string()
}

/// Quotes `value` for use as a single shell word.
#[must_use]
pub fn shell_quote(value: &str) -> String {
    let is_plain = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_./-=:,+@%".contains(c));

    if is_plain {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn wrap_command_trims_and_braces_input() {
        assert_eq!(wrap_command("  ls -la # list\n"), "{\nls -la # list\n}");
    }

    #[test]
    fn echoed_block_is_removed_line_by_line() {
        let wrapped = wrap_command("echo hi");
        let raw = "{\r\necho hi\r\n}\r\nhi\r\n\r\n";

        assert_eq!(clean_output(raw, &wrapped, "echo hi"), "hi");
    }

    #[test]
    fn single_echoed_command_line_is_removed_when_block_does_not_match() {
        let wrapped = wrap_command("echo hi");
        let raw = "echo hi\r\nhi\r\n";

        assert_eq!(clean_output(raw, &wrapped, "echo hi"), "hi");
    }

    #[test]
    fn output_without_echo_is_untouched() {
        let wrapped = wrap_command("printf 'a\\n\\n  b\\n'");
        let raw = "a\r\n\r\n  b\r\n\r\n";

        assert_eq!(clean_output(raw, &wrapped, "printf 'a\\n\\n  b\\n'"), "a\n\n  b");
    }

    #[test]
    fn ansi_sequences_are_removed() {
        let text = "\x1b[1;31mred\x1b[0m \x1b]0;title\x07plain \x1bMdone\x1b[2K";

        assert_eq!(strip_ansi(text), "red plain done");
    }

    #[test]
    fn trimming_keeps_leading_indentation() {
        let wrapped = wrap_command("cat file");
        assert_eq!(clean_output("\r\n    indented\r\n", &wrapped, "cat file"), "    indented");
    }

    #[test]
    fn shell_quote_leaves_plain_words_and_quotes_the_rest() {
        assert_eq!(shell_quote("src/main.rs"), "src/main.rs");
        assert_eq!(shell_quote("fn main"), "'fn main'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }
}

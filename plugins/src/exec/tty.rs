use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // CSI sequences, OSC titles (BEL or ST terminated) and lone two-byte escapes.
    static ref ANSI_RE: Regex =
        Regex::new(r"\x1b\[[0-?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b[@-Z\\-_]")
            .unwrap();
}

const PROMPT_ENDINGS: [&str; 3] = ["# ", "$ ", "> "];

/// Turns raw terminal output of one relayed command into plain text.
///
/// Escape sequences are removed and line endings become `\n`. When `echo` is
/// given, a leading line that ends with it (the shell echoing the typed
/// command, possibly after a prompt) is dropped. A trailing unterminated
/// prompt is dropped as well.
pub fn normalize_tty_output(raw: &str, echo: Option<&str>) -> String {
    let stripped = ANSI_RE.replace_all(raw, "");
    let mut text = stripped.replace("\r\n", "\n").replace('\r', "");

    if let Some(command) = echo.map(str::trim).filter(|c| !c.is_empty()) {
        if let Some((first, rest)) = text.split_once('\n') {
            if first.trim_end().ends_with(command) {
                text = rest.to_string();
            }
        } else if text.trim_end().ends_with(command) {
            text.clear();
        }
    }

    let last_line_start = text.rfind('\n').map(|i| i + 1).unwrap_or(0);
    let last_line = &text[last_line_start..];
    if !last_line.is_empty() && PROMPT_ENDINGS.iter().any(|p| last_line.ends_with(p)) {
        text.truncate(last_line_start);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn strips_echo_and_prompt() {
        let raw = "root@box:/# echo hi\r\nhi\r\nroot@box:/# ";
        assert_eq!(normalize_tty_output(raw, Some("echo hi")), "hi\n");
    }

    #[test]
    fn command_without_output_is_empty() {
        let raw = "cd /tmp\r\nroot@box:/tmp# ";
        assert_eq!(normalize_tty_output(raw, Some("cd /tmp")), "");
    }

    #[test]
    fn removes_color_and_title_sequences() {
        let raw = "ls\r\n\x1b[01;34mbin\x1b[0m  etc\r\n\x1b]0;root@box: /\x07root@box:/# ";
        assert_eq!(normalize_tty_output(raw, Some("ls")), "bin  etc\n");
    }

    #[test]
    fn keeps_first_line_that_is_not_the_echo() {
        let raw = "partial output\r\nmore\r\n";
        assert_eq!(
            normalize_tty_output(raw, Some("echo x")),
            "partial output\nmore\n"
        );
        assert_eq!(normalize_tty_output(raw, None), "partial output\nmore\n");
    }

    #[test]
    fn stray_carriage_returns_are_dropped() {
        assert_eq!(normalize_tty_output("50%\r100%\n", None), "50%100%\n");
    }
}

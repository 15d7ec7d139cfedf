use std::time::Duration;

/// Per-container shell state the scripted commands operate on.
#[derive(Debug, Clone)]
pub struct ShellState {
    pub hostname: String,
    pub cwd: String,
    pub history: Vec<String>,
}

impl ShellState {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            cwd: "/".to_string(),
            history: Vec::new(),
        }
    }
}

/// Runs one command line against `state` and returns its combined output.
///
/// Understands `echo`, `pwd`, `cd`, `history`, `hostname`, `seq N`,
/// `sleep N` (seconds, fractions allowed), `true`, `false`; anything else is
/// "not found". `;`-separated lists run in order.
pub async fn run_script(state: &mut ShellState, line: &str) -> String {
    let line = line.trim();
    if line.is_empty() {
        return String::new();
    }
    state.history.push(line.to_string());

    let mut out = String::new();
    for part in line.split(';') {
        out.push_str(&run_one(state, part.trim()).await);
    }
    out
}

async fn run_one(state: &mut ShellState, cmd: &str) -> String {
    let (name, rest) = match cmd.split_once(char::is_whitespace) {
        Some((n, r)) => (n, r.trim()),
        None => (cmd, ""),
    };
    match name {
        "" | "true" | "false" => String::new(),
        "echo" => format!("{}\n", unquote(rest)),
        "pwd" => format!("{}\n", state.cwd),
        "cd" => {
            state.cwd = match rest {
                "" | "~" => "/root".to_string(),
                p if p.starts_with('/') => p.to_string(),
                p => format!("{}/{}", state.cwd.trim_end_matches('/'), p),
            };
            String::new()
        }
        "hostname" => format!("{}\n", state.hostname),
        "history" => state
            .history
            .iter()
            .enumerate()
            .map(|(i, h)| format!("{:>5}  {h}\n", i + 1))
            .collect(),
        "seq" => {
            let n: u64 = rest.parse().unwrap_or(0);
            (1..=n).map(|i| format!("{i}\n")).collect()
        }
        "sleep" => {
            let secs: f64 = rest.parse().unwrap_or(0.0);
            tokio::time::sleep(Duration::from_secs_f64(secs.max(0.0))).await;
            String::new()
        }
        other => format!("sh: 1: {other}: not found\n"),
    }
}

fn unquote(s: &str) -> &str {
    let s = s.trim();
    for q in ['"', '\''] {
        if s.len() >= 2 && s.starts_with(q) && s.ends_with(q) {
            return &s[1..s.len() - 1];
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_commands() {
        let mut st = ShellState::new("box1");
        assert_eq!(run_script(&mut st, "echo hi").await, "hi\n");
        assert_eq!(run_script(&mut st, "echo 'a b'").await, "a b\n");
        assert_eq!(run_script(&mut st, "cd /tmp; pwd").await, "/tmp\n");
        assert_eq!(run_script(&mut st, "hostname").await, "box1\n");
        assert_eq!(run_script(&mut st, "seq 3").await, "1\n2\n3\n");
        assert_eq!(run_script(&mut st, "false").await, "");
        assert!(run_script(&mut st, "frobnicate").await.contains("not found"));
        let history = run_script(&mut st, "history").await;
        assert!(history.contains("    1  echo hi\n"));
    }
}

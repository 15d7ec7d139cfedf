use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};
use ghostgate_core::api::{ApprovalMode, ExecStrategyKind};

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyArg {
    Oneshot,
    PtyRelay,
}

impl From<StrategyArg> for ExecStrategyKind {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Oneshot => ExecStrategyKind::OneShot,
            StrategyArg::PtyRelay => ExecStrategyKind::PtyRelay,
        }
    }
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalArg {
    Single,
    Multi,
}

impl From<ApprovalArg> for ApprovalMode {
    fn from(arg: ApprovalArg) -> Self {
        match arg {
            ApprovalArg::Single => ApprovalMode::Single,
            ApprovalArg::Multi => ApprovalMode::Multi,
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(version, about = "Human approval gate for agent-proposed shell commands")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (defaults to ./config.toml, then ~/.ghostgate/config.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Control API base URL for client commands (defaults to the configured host/port).
    #[arg(long, global = true)]
    pub control_url: Option<String>,
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct ServeArgs {
    /// Proposer endpoint: a socket path or tcp://127.0.0.1:PORT.
    #[arg(long)]
    pub listen: Option<String>,

    #[arg(long, value_enum)]
    pub strategy: Option<StrategyArg>,

    #[arg(long, value_enum)]
    pub approval_mode: Option<ApprovalArg>,

    /// Start with allow-all enabled.
    #[arg(long, default_value_t = false)]
    pub allow_all: bool,

    /// Start paused: every proposal is rejected until resumed.
    #[arg(long, default_value_t = false)]
    pub paused: bool,

    /// Enable the websocket shell bridge.
    #[arg(long, default_value_t = false)]
    pub bridge: bool,

    #[arg(long)]
    pub control_port: Option<u16>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ProposeArgs {
    /// Session id; a random sess_ id is generated when omitted.
    #[arg(long)]
    pub session: Option<String>,

    #[arg(long)]
    pub command: String,

    /// Proposer endpoint (defaults to the configured listener).
    #[arg(long)]
    pub listen: Option<String>,

    /// Use 4-byte length-prefixed framing instead of a JSON line.
    #[arg(long, default_value_t = false)]
    pub length_prefixed: bool,

    /// Print the raw JSON response instead of just the output.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct PolicyArgs {
    #[arg(long)]
    pub allow_all: Option<bool>,

    #[arg(long)]
    pub paused: Option<bool>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SessionAction {
    List,
    Status {
        id: String,
    },
    Start {
        id: String,
        #[arg(long)]
        image: Option<String>,
    },
    Stop {
        id: String,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the proposer listener and the control API.
    Serve(ServeArgs),
    /// Send one command proposal and wait for the verdict.
    Propose(ProposeArgs),
    /// List commands awaiting a decision.
    Pending,
    /// List recently resolved commands.
    History,
    Approve {
        id: u64,
    },
    Reject {
        id: u64,
    },
    /// Show or change allow-all / pause.
    Policy(PolicyArgs),
    #[command(subcommand)]
    Session(SessionAction),
    /// Stream gate events as they happen.
    Watch,
    /// Ask a running server to shut down.
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_serve_overrides() {
        let args = Args::try_parse_from([
            "ghostgate",
            "serve",
            "--strategy",
            "pty-relay",
            "--approval-mode",
            "single",
            "--listen",
            "tcp://127.0.0.1:7878",
        ])
        .unwrap();
        match args.command {
            Commands::Serve(serve) => {
                assert_eq!(serve.strategy, Some(StrategyArg::PtyRelay));
                assert_eq!(serve.approval_mode, Some(ApprovalArg::Single));
                assert_eq!(serve.listen.as_deref(), Some("tcp://127.0.0.1:7878"));
                assert!(!serve.bridge);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_client_commands() {
        let args = Args::try_parse_from(["ghostgate", "approve", "7"]).unwrap();
        assert!(matches!(args.command, Commands::Approve { id: 7 }));

        let args = Args::try_parse_from([
            "ghostgate",
            "--control-url",
            "http://127.0.0.1:9000",
            "session",
            "start",
            "s1",
            "--image",
            "alpine:latest",
        ])
        .unwrap();
        assert_eq!(args.control_url.as_deref(), Some("http://127.0.0.1:9000"));
        match args.command {
            Commands::Session(SessionAction::Start { id, image }) => {
                assert_eq!(id, "s1");
                assert_eq!(image.as_deref(), Some("alpine:latest"));
            }
            other => panic!("unexpected {other:?}"),
        }

        let args = Args::try_parse_from(["ghostgate", "policy", "--paused", "true"]).unwrap();
        match args.command {
            Commands::Policy(p) => {
                assert_eq!(p.paused, Some(true));
                assert_eq!(p.allow_all, None);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn propose_requires_command() {
        assert!(Args::try_parse_from(["ghostgate", "propose", "--session", "s1"]).is_err());
    }
}

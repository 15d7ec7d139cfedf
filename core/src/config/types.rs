use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::protocol::Endpoint;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub container: ContainerConfig,

    #[serde(default)]
    pub listener: ListenerConfig,

    #[serde(default)]
    pub gatekeeper: GatekeeperConfig,

    #[serde(default)]
    pub execution: ExecutionConfig,

    #[serde(default)]
    pub control: ControlConfig,

    #[serde(default)]
    pub bridge: BridgeConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.container.image.trim().is_empty() {
            return Err(ConfigError::Validation("container.image must not be empty".into()));
        }
        let prefix = &self.container.container_prefix;
        if prefix.is_empty()
            || !prefix.starts_with(|c: char| c.is_ascii_alphanumeric())
            || !prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        {
            return Err(ConfigError::Validation(format!(
                "container.container_prefix '{prefix}' is not a valid container name prefix"
            )));
        }
        if self.container.shell.trim().is_empty() {
            return Err(ConfigError::Validation("container.shell must not be empty".into()));
        }

        Endpoint::parse(&self.listener.listen)?;
        if self.listener.max_request_bytes == 0 {
            return Err(ConfigError::Validation(
                "listener.max_request_bytes must be > 0".into(),
            ));
        }

        let exec = &self.execution;
        if exec.drain_timeout_ms == 0 {
            return Err(ConfigError::Validation("execution.drain_timeout_ms must be > 0".into()));
        }
        if exec.poll_interval_ms == 0 || exec.poll_interval_ms > exec.drain_timeout_ms {
            return Err(ConfigError::Validation(format!(
                "execution.poll_interval_ms must be in 1..={}",
                exec.drain_timeout_ms
            )));
        }
        if exec.capture_bytes < 1024 {
            return Err(ConfigError::Validation(
                "execution.capture_bytes must be at least 1024".into(),
            ));
        }

        if self.control.port == 0 {
            return Err(ConfigError::Validation("control.port must be > 0".into()));
        }
        Ok(())
    }

    /// Base URL of the HTTP control API described by this config.
    pub fn control_url(&self) -> String {
        format!("http://{}:{}", self.control.host, self.control.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerConfig {
    #[serde(default = "default_image")]
    pub image: String,

    /// Container names are `<container_prefix>_<session id>`.
    #[serde(default = "default_container_prefix")]
    pub container_prefix: String,

    #[serde(default = "default_shell")]
    pub shell: String,

    #[serde(default)]
    pub remove_on_exit: bool,
}

fn default_image() -> String {
    "ubuntu:24.04".to_string()
}

fn default_container_prefix() -> String {
    "ghostshell".to_string()
}

fn default_shell() -> String {
    "/bin/bash".to_string()
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            image: default_image(),
            container_prefix: default_container_prefix(),
            shell: default_shell(),
            remove_on_exit: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// Unix socket path (optionally `unix://`-prefixed) or `tcp://host:port`.
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Upper bound on how long a proposer waits for an operator; 0 disables it.
    #[serde(default = "default_decision_timeout_ms")]
    pub decision_timeout_ms: u64,

    #[serde(default = "default_max_request_bytes")]
    pub max_request_bytes: usize,
}

#[cfg(unix)]
fn default_listen() -> String {
    "/tmp/ki_shell.sock".to_string()
}

#[cfg(not(unix))]
fn default_listen() -> String {
    "tcp://127.0.0.1:7878".to_string()
}

fn default_decision_timeout_ms() -> u64 {
    300_000
}

fn default_max_request_bytes() -> usize {
    1024 * 1024
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            decision_timeout_ms: default_decision_timeout_ms(),
            max_request_bytes: default_max_request_bytes(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalMode {
    Single,
    #[default]
    Multi,
}

impl std::str::FromStr for ApprovalMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(ApprovalMode::Single),
            "multi" => Ok(ApprovalMode::Multi),
            other => Err(ConfigError::Validation(format!(
                "unknown approval mode '{other}' (expected single|multi)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatekeeperConfig {
    #[serde(default)]
    pub approval_mode: ApprovalMode,

    #[serde(default)]
    pub allow_all: bool,

    #[serde(default)]
    pub paused: bool,

    #[serde(default = "default_history_size")]
    pub history_size: usize,
}

fn default_history_size() -> usize {
    64
}

impl Default for GatekeeperConfig {
    fn default() -> Self {
        Self {
            approval_mode: ApprovalMode::default(),
            allow_all: false,
            paused: false,
            history_size: default_history_size(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ExecStrategyKind {
    #[default]
    #[serde(rename = "oneshot", alias = "one-shot")]
    OneShot,
    #[serde(rename = "pty-relay", alias = "pty_relay")]
    PtyRelay,
}

impl std::str::FromStr for ExecStrategyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "oneshot" | "one-shot" => Ok(ExecStrategyKind::OneShot),
            "pty-relay" | "pty_relay" => Ok(ExecStrategyKind::PtyRelay),
            other => Err(ConfigError::Validation(format!(
                "unknown execution strategy '{other}' (expected oneshot|pty-relay)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub strategy: ExecStrategyKind,

    /// PTY-relay: hard cap on how long output is drained after a command.
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,

    /// PTY-relay: quiet period that ends the drain once output has started.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// One-shot: 0 waits for the process to finish.
    #[serde(default)]
    pub exec_timeout_ms: u64,

    #[serde(default = "default_capture_bytes")]
    pub capture_bytes: usize,
}

fn default_drain_timeout_ms() -> u64 {
    3_000
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_capture_bytes() -> usize {
    65_536
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            strategy: ExecStrategyKind::default(),
            drain_timeout_ms: default_drain_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            exec_timeout_ms: 0,
            capture_bytes: default_capture_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    #[serde(default = "default_control_host")]
    pub host: String,

    #[serde(default = "default_control_port")]
    pub port: u16,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_control_host() -> String {
    "127.0.0.1".to_string()
}

fn default_control_port() -> u16 {
    8765
}

fn default_request_timeout_ms() -> u64 {
    120_000
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            host: default_control_host(),
            port: default_control_port(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BridgeConfig {
    /// Live terminal streaming bypasses approval, so it is off unless asked for.
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.container.image, "ubuntu:24.04");
        assert_eq!(cfg.container.container_prefix, "ghostshell");
        assert_eq!(cfg.gatekeeper.approval_mode, ApprovalMode::Multi);
        assert_eq!(cfg.execution.strategy, ExecStrategyKind::OneShot);
        assert_eq!(cfg.execution.drain_timeout_ms, 3_000);
        assert_eq!(cfg.listener.decision_timeout_ms, 300_000);
        assert!(!cfg.bridge.enabled);
        cfg.validate().unwrap();
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [container]
            image = "alpine:latest"

            [execution]
            strategy = "pty-relay"
            exec_timeout_ms = 10000

            [gatekeeper]
            approval_mode = "single"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.container.image, "alpine:latest");
        assert_eq!(cfg.container.shell, "/bin/bash");
        assert_eq!(cfg.execution.strategy, ExecStrategyKind::PtyRelay);
        assert_eq!(cfg.execution.exec_timeout_ms, 10_000);
        assert_eq!(cfg.execution.capture_bytes, 65_536);
        assert_eq!(cfg.gatekeeper.approval_mode, ApprovalMode::Single);
        assert_eq!(cfg.gatekeeper.history_size, 64);
    }

    #[test]
    fn strategy_accepts_aliases() {
        let cfg: AppConfig = toml::from_str("[execution]\nstrategy = \"one-shot\"").unwrap();
        assert_eq!(cfg.execution.strategy, ExecStrategyKind::OneShot);
        assert_eq!("pty_relay".parse::<ExecStrategyKind>().unwrap(), ExecStrategyKind::PtyRelay);
        assert!("fork".parse::<ExecStrategyKind>().is_err());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut cfg = AppConfig::default();
        cfg.execution.poll_interval_ms = cfg.execution.drain_timeout_ms + 1;
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));

        let mut cfg = AppConfig::default();
        cfg.container.container_prefix = "-bad name".into();
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));

        let mut cfg = AppConfig::default();
        cfg.listener.listen = "tcp://10.1.2.3:7878".into();
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn control_url_uses_host_and_port() {
        let mut cfg = AppConfig::default();
        cfg.control.port = 9000;
        assert_eq!(cfg.control_url(), "http://127.0.0.1:9000");
    }
}

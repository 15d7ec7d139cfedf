use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::types::AppConfig;
use crate::error::ConfigError;

/// Loads `config.toml` from the working directory, then `~/.ghostgate/config.toml`,
/// falling back to defaults, and applies process env overrides.
pub fn load_default() -> Result<AppConfig, ConfigError> {
    load(None)
}

pub fn load(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut cfg = match resolve_path(path)? {
        Some(p) => read_file(&p)?,
        None => AppConfig::default(),
    };

    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok())?;
    cfg.validate()?;
    Ok(cfg)
}

fn resolve_path(explicit: Option<&Path>) -> Result<Option<PathBuf>, ConfigError> {
    if let Some(p) = explicit {
        let expanded = PathBuf::from(shellexpand::tilde(&p.to_string_lossy()).into_owned());
        if !expanded.exists() {
            return Err(ConfigError::NotFound(expanded.display().to_string()));
        }
        return Ok(Some(expanded));
    }

    let local = PathBuf::from("config.toml");
    if local.exists() {
        return Ok(Some(local));
    }

    if let Some(home) = dirs::home_dir() {
        let user = home.join(".ghostgate").join("config.toml");
        if user.exists() {
            return Ok(Some(user));
        }
    }
    Ok(None)
}

fn read_file(path: &Path) -> Result<AppConfig, ConfigError> {
    let s = std::fs::read_to_string(path).map_err(|e| ConfigError::Parse(e.into()))?;
    toml::from_str::<AppConfig>(&s).map_err(|e| ConfigError::Parse(e.into()))
}

/// Applies `GHOSTSHELL_*` / `GHOSTGATE_*` overrides. Blank values are ignored.
pub fn apply_env_overrides<F>(cfg: &mut AppConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = get("GHOSTSHELL_IMAGE") {
        cfg.container.image = v.trim().to_string();
    }
    if let Some(v) = get("GHOSTSHELL_CONTAINER") {
        cfg.container.container_prefix = v.trim().to_string();
    }
    if let Some(v) = get("GHOSTGATE_LISTEN") {
        cfg.listener.listen = v.trim().to_string();
    }
    if let Some(v) = get("GHOSTGATE_STRATEGY") {
        cfg.execution.strategy = parse_env("GHOSTGATE_STRATEGY", &v)?;
    }
    if let Some(v) = get("GHOSTGATE_DRAIN_TIMEOUT_MS") {
        cfg.execution.drain_timeout_ms = parse_env("GHOSTGATE_DRAIN_TIMEOUT_MS", &v)?;
    }
    if let Some(v) = get("GHOSTGATE_APPROVAL_MODE") {
        cfg.gatekeeper.approval_mode = parse_env("GHOSTGATE_APPROVAL_MODE", &v)?;
    }
    if let Some(v) = get("GHOSTGATE_CONTROL_ADDR") {
        let addr: std::net::SocketAddr = parse_env("GHOSTGATE_CONTROL_ADDR", &v)?;
        cfg.control.host = addr.ip().to_string();
        cfg.control.port = addr.port();
    }
    if let Some(v) = get("GHOSTGATE_LOG_FILE") {
        cfg.logging.file = Some(v.trim().to_string());
    }
    Ok(())
}

fn parse_env<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| ConfigError::EnvInvalid {
        key: key.to_string(),
        source: anyhow::anyhow!("{e}: '{raw}'"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApprovalMode, ExecStrategyKind};
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let mut cfg = AppConfig::default();
        apply_env_overrides(
            &mut cfg,
            env(&[
                ("GHOSTSHELL_IMAGE", "debian:12"),
                ("GHOSTSHELL_CONTAINER", "agentbox"),
                ("GHOSTGATE_LISTEN", "tcp://127.0.0.1:9999"),
                ("GHOSTGATE_STRATEGY", "pty-relay"),
                ("GHOSTGATE_DRAIN_TIMEOUT_MS", "1500"),
                ("GHOSTGATE_APPROVAL_MODE", "single"),
                ("GHOSTGATE_CONTROL_ADDR", "127.0.0.1:9100"),
            ]),
        )
        .unwrap();

        assert_eq!(cfg.container.image, "debian:12");
        assert_eq!(cfg.container.container_prefix, "agentbox");
        assert_eq!(cfg.listener.listen, "tcp://127.0.0.1:9999");
        assert_eq!(cfg.execution.strategy, ExecStrategyKind::PtyRelay);
        assert_eq!(cfg.execution.drain_timeout_ms, 1500);
        assert_eq!(cfg.gatekeeper.approval_mode, ApprovalMode::Single);
        assert_eq!(cfg.control.port, 9100);
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let mut cfg = AppConfig::default();
        apply_env_overrides(&mut cfg, env(&[("GHOSTSHELL_IMAGE", "  ")])).unwrap();
        assert_eq!(cfg.container.image, "ubuntu:24.04");
    }

    #[test]
    fn unparsable_env_value_is_reported_with_key() {
        let mut cfg = AppConfig::default();
        let err = apply_env_overrides(&mut cfg, env(&[("GHOSTGATE_DRAIN_TIMEOUT_MS", "soon")]))
            .unwrap_err();
        match err {
            ConfigError::EnvInvalid { key, .. } => assert_eq!(key, "GHOSTGATE_DRAIN_TIMEOUT_MS"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn explicit_missing_path_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            load(Some(&missing)),
            Err(ConfigError::NotFound(_))
        ));
    }

    #[test]
    fn explicit_path_is_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[gatekeeper]\nallow_all = true\n\n[listener]\nlisten = \"tcp://127.0.0.1:7001\"\n",
        )
        .unwrap();

        let cfg = read_file(&path).unwrap();
        assert!(cfg.gatekeeper.allow_all);
        assert_eq!(cfg.listener.listen, "tcp://127.0.0.1:7001");
    }

    #[test]
    fn invalid_toml_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[gatekeeper\n").unwrap();
        assert!(matches!(read_file(&path), Err(ConfigError::Parse(_))));
    }
}

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
#[cfg(unix)]
use std::path::PathBuf;

use crate::error::ConfigError;

/// Where the proposer socket lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    #[cfg(unix)]
    Unix(PathBuf),
    /// Loopback only.
    Tcp(SocketAddr),
}

impl Endpoint {
    /// Accepts `tcp://host:port`, `unix://path`, or a bare socket path.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ConfigError::Validation("listen endpoint is empty".into()));
        }

        if let Some(addr) = raw.strip_prefix("tcp://") {
            let addr = parse_loopback(addr)?;
            return Ok(Endpoint::Tcp(addr));
        }

        let path = raw.strip_prefix("unix://").unwrap_or(raw);
        Self::unix(path)
    }

    #[cfg(unix)]
    fn unix(path: &str) -> Result<Self, ConfigError> {
        if path.is_empty() {
            return Err(ConfigError::Validation("unix socket path is empty".into()));
        }
        let expanded = shellexpand::tilde(path).into_owned();
        Ok(Endpoint::Unix(PathBuf::from(expanded)))
    }

    #[cfg(not(unix))]
    fn unix(path: &str) -> Result<Self, ConfigError> {
        Err(ConfigError::Validation(format!(
            "unix sockets are not available on this platform ('{path}'); use tcp://127.0.0.1:<port>"
        )))
    }
}

fn parse_loopback(addr: &str) -> Result<SocketAddr, ConfigError> {
    let parsed = match addr.strip_prefix("localhost:") {
        Some(port) => port
            .parse::<u16>()
            .map(|p| SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), p))
            .map_err(|e| ConfigError::Validation(format!("invalid port in '{addr}': {e}")))?,
        None => addr
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Validation(format!("invalid tcp address '{addr}': {e}")))?,
    };
    if !parsed.ip().is_loopback() {
        return Err(ConfigError::Validation(format!(
            "tcp endpoint {parsed} is not a loopback address"
        )));
    }
    Ok(parsed)
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            #[cfg(unix)]
            Endpoint::Unix(path) => write!(f, "unix://{}", path.display()),
            Endpoint::Tcp(addr) => write!(f, "tcp://{addr}"),
        }
    }
}

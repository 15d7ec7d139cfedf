// core/src/error/cli_error.rs
use thiserror::Error;

use super::{ConfigError, ProtocolError, RuntimeError};

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to bind {endpoint}")]
    Bind {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("control api error: {0}")]
    Http(String),

    #[error("{0}")]
    Command(String),
}

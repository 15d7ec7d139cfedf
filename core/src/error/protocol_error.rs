// core/src/error/protocol_error.rs
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("request too large: {actual_bytes} bytes (max {max_bytes})")]
    TooLarge {
        actual_bytes: usize,
        max_bytes: usize,
    },

    #[error("peer closed the connection before sending a request")]
    Closed,

    #[error("connection closed without a response")]
    NoResponse,

    #[error("socket io error")]
    Io(#[from] std::io::Error),
}

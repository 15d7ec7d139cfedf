mod cli_error;
mod config_error;
mod gate_error;
mod protocol_error;
mod runtime_error;
mod session_error;

pub use cli_error::CliError;
pub use config_error::ConfigError;
pub use gate_error::GateError;
pub use protocol_error::ProtocolError;
pub use runtime_error::RuntimeError;
pub use session_error::SessionError;

//! Stable re-exports for consumers (`cli`, `plugins`, and external crates).
//!
//! Prefer importing from `ghostgate_core::api` instead of reaching into internal modules.

pub use crate::bridge::{run_bridge, BridgeEnd, BridgeSummary, PtyProvider, RegistryPtyProvider};
pub use crate::config::{
    apply_env_overrides, load, load_default, AppConfig, ApprovalMode, BridgeConfig, ContainerConfig, ControlConfig,
    ExecStrategyKind, ExecutionConfig, GatekeeperConfig, ListenerConfig, LoggingConfig,
};
pub use crate::context::AppContext;
pub use crate::error::{
    CliError, ConfigError, GateError, ProtocolError, RuntimeError, SessionError,
};
pub use crate::exec::{
    describe_error, CaptureBuffer, CapturedOutput, CommandExecutor, ExecOutput, ExecStrategy,
    ExecutionAdapter,
};
pub use crate::gatekeeper::{
    CommandStatus, GateEvent, GateOptions, GatePolicy, Gatekeeper, PendingCommand, Submission,
    Ticket, Verdict,
};
pub use crate::protocol::{
    propose, read_request, read_response, write_request, write_response, BoundListener,
    ConnectionOutcome, DecodedRequest, Endpoint, Framing, ListenerOptions, ProposalRequest,
    ProtocolListener,
};
pub use crate::runtime::{ContainerHandle, ContainerRuntime, ExecIo, InputSink, OutputStream};
pub use crate::session::{
    container_name, ContainerSession, RegistryOptions, SessionRegistry, SessionStatus,
};

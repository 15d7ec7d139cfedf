mod adapter;
mod capture;
mod r#trait;

pub use adapter::{describe_error, ExecutionAdapter};
pub use capture::{CaptureBuffer, CapturedOutput};
pub use r#trait::{CommandExecutor, ExecOutput, ExecStrategy};

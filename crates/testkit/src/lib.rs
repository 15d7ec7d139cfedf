//! Test doubles shared by the ghostgate crates.

mod executor;
mod harness;
mod runtime;
mod script;

pub use executor::FakeExecutor;
pub use harness::{socket_config, spawn_listener, RunningListener};
pub use runtime::{FakeRuntime, FAKE_PROMPT};
pub use script::{run_script, ShellState};

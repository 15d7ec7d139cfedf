// core/src/runtime/trait.rs
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWrite;

use crate::error::RuntimeError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerHandle {
    pub id: String,
    pub name: String,
    pub running: bool,
}

/// Combined stdout/stderr of an exec, chunked as the runtime delivers it.
pub type OutputStream = Pin<Box<dyn Stream<Item = Result<Bytes, RuntimeError>> + Send>>;

pub type InputSink = Pin<Box<dyn AsyncWrite + Send>>;

/// Both halves of an exec'd process.
pub struct ExecIo {
    pub output: OutputStream,
    pub input: InputSink,
}

impl std::fmt::Debug for ExecIo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecIo").finish_non_exhaustive()
    }
}

/// Narrow view of a container engine: only what sessions and execution need.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    fn name(&self) -> &str;

    /// Creates (but does not start) a container. `interactive` keeps stdin open
    /// and allocates a tty so the entrypoint shell stays alive.
    async fn create(
        &self,
        image: &str,
        command: &[String],
        interactive: bool,
        name: &str,
    ) -> Result<ContainerHandle, RuntimeError>;

    /// Looks a container up by name. A missing container is `Ok(None)`.
    async fn get(&self, name: &str) -> Result<Option<ContainerHandle>, RuntimeError>;

    async fn start(&self, handle: &ContainerHandle) -> Result<(), RuntimeError>;

    async fn remove(&self, handle: &ContainerHandle, force: bool) -> Result<(), RuntimeError>;

    async fn exec(
        &self,
        handle: &ContainerHandle,
        command: &[String],
        tty: bool,
    ) -> Result<ExecIo, RuntimeError>;
}

mod r#trait;

pub use r#trait::{ContainerHandle, ContainerRuntime, ExecIo, InputSink, OutputStream};

mod registry;
mod types;

pub use registry::{container_name, RegistryOptions, SessionRegistry};
pub use types::{ContainerSession, SessionStatus};

pub mod api;
pub mod bridge;
pub mod config;
pub mod context;
pub mod error;
pub mod exec;
pub mod gatekeeper;
pub mod protocol;
pub mod runtime;
pub mod session;

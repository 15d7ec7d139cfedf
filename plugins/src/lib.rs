pub mod exec;
pub mod factory;
pub mod runtime;

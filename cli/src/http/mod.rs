//! Loopback HTTP control API: pending queue, policy, sessions, events and
//! the optional websocket shell bridge.

pub mod bridge;
pub mod events;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;
pub mod state;

pub use state::AppState;

pub mod oneshot;
pub mod pty_relay;
pub mod tty;

pub use oneshot::OneShotStrategy;
pub use pty_relay::PtyRelayStrategy;

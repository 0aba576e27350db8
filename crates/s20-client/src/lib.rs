//! s20-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`,
//! the `s20` binary, and the `s20-http` server share the same module tree.
//!
//! # What does s20-client do?
//!
//! It talks to Orvibo S20 WiFi plugs over UDP:
//!
//! 1. Broadcasts a discovery probe and collects the plugs' announcements
//!    (`application::discovery`).
//! 2. Subscribes to a plug before commanding it, renewing the subscription
//!    when it ages out or a command goes unanswered
//!    (`application::session_manager`).
//! 3. Reads and switches the relay (`application::controller`).
//!
//! The socket sits behind the `Transport` trait, with a real UDP
//! implementation and an in-memory simulated network for tests.

/// Application layer: discovery, sessions, and device control.
pub mod application;

/// Infrastructure layer: UDP transport and configuration file.
pub mod infrastructure;

pub use application::controller::{ControlError, DeviceController};
pub use application::discovery::{discover, locate, DiscoveryError, DiscoveryResult};
pub use application::exchange::RetryPolicy;
pub use application::session_manager::{SessionError, SessionManager};
pub use infrastructure::transport::{Transport, TransportConfig, TransportError, UdpTransport};

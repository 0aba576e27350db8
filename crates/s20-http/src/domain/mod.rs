//! Domain layer for s20-http.
//!
//! Plain types with no I/O: the server configuration and the JSON bodies
//! the routes return.

pub mod config;
pub mod messages;

pub use config::ServerConfig;
pub use messages::{DeviceEntry, ErrorResponse, PlugStateResponse, PowerState};

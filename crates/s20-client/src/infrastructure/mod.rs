//! Infrastructure layer for the S20 client.
//!
//! # Sub-modules
//!
//! - **`transport`** – The `Transport` trait, the real `UdpTransport`, and
//!   the `SimulatedNetwork` used by tests.
//!
//! - **`storage`** – The TOML configuration file and its defaults.

pub mod storage;
pub mod transport;

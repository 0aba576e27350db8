//! # s20-core
//!
//! Shared library for the Orvibo S20 client containing the UDP wire codec,
//! the device model, and the subscription state machine.
//!
//! This crate is used by both the command-line tool and the HTTP server.
//! It has no dependencies on sockets, async runtimes, or OS APIs.
//!
//! # Architecture overview
//!
//! The S20 is a WiFi smart plug controlled over a small binary UDP protocol
//! on port 10000.  A client discovers plugs with a broadcast probe, then
//! subscribes to a plug before it may read or switch its relay.
//!
//! - **`protocol`** – How bytes travel over the network.  Frames are a
//!   6-byte header (magic, length, command) followed by a command-specific
//!   payload, decoded into typed [`S20Message`]s.
//!
//! - **`domain`** – Hardware ids, the [`Device`] record, and the
//!   [`Session`] state machine that gates control commands.

pub mod domain;
pub mod protocol;

pub use domain::device::{Device, DeviceError, DeviceType, HardwareId};
pub use domain::session::{Session, SessionState};
pub use protocol::codec::{
    decode_frame, decode_message, encode_frame, encode_message, ProtocolError,
};
pub use protocol::messages::S20Message;

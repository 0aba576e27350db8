//! Domain entities for the S20 client.
//!
//! Pure types with no sockets, no runtime, and no OS calls:
//!
//! - [`device`] – hardware ids, device types, and the [`device::Device`]
//!   record produced by discovery.
//! - [`session`] – the per-device subscription state machine.

pub mod device;
pub mod session;

//! Application layer use cases for the S20 client.
//!
//! - **`exchange`** – Send-and-wait with a bounded retry budget, shared by
//!   every unicast request.
//!
//! - **`discovery`** – Broadcast probe and announcement collection, plus
//!   `locate` to learn the hardware id of a plug whose address is known.
//!
//! - **`session_manager`** – Per-device subscription handshakes.  The plug
//!   ignores commands from clients that have not subscribed recently.
//!
//! - **`controller`** – `get_state` / `set_state` on top of the session
//!   manager, mapping failures to the errors the front ends report.

pub mod controller;
pub mod discovery;
pub mod exchange;
pub mod session_manager;

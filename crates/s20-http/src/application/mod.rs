//! Application layer for s20-http.
//!
//! - **`plug_service`** – Resolves addresses to plugs and runs status and
//!   switch operations one at a time over the shared transport.

pub mod plug_service;

pub use plug_service::{PlugService, PlugServiceError};

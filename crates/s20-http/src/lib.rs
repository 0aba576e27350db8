//! s20-http library crate.
//!
//! Exposes Orvibo S20 plugs as plain HTTP GET endpoints so that scripts and
//! home-automation hubs can switch them without speaking the UDP protocol.
//!
//! # Architecture
//!
//! ```text
//! HTTP client (GET /ON/192.168.1.40)
//!         ↕
//! [s20-http]
//!   ├── domain/           ServerConfig, JSON bodies
//!   ├── application/      PlugService: address lookup, serialized device access
//!   └── infrastructure/
//!         └── http/       axum router, handlers, status-code mapping
//!         ↕
//! s20-client (discovery, sessions, control) over UDP port 10000
//! ```

/// Domain layer: configuration and response types (no I/O).
pub mod domain;

/// Application layer: plug operations behind the routes.
pub mod application;

/// Infrastructure layer: HTTP router and listener.
pub mod infrastructure;

//! Storage infrastructure: the TOML configuration file shared by the `s20`
//! and `s20-http` binaries.
//!
//! Discovered devices are never written to disk; every run rediscovers them.

pub mod config;

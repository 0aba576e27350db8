//! Server configuration.
//!
//! [`ServerConfig`] holds every runtime setting of the HTTP front end.  It is
//! built once in `main.rs` from the shared config file plus command-line
//! overrides, and can be constructed directly in tests.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use s20_client::infrastructure::storage::config::{AppConfig, ConfigError};
use s20_client::RetryPolicy;

/// All runtime configuration for the HTTP server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    pub http_addr: SocketAddr,
    /// Listening time of the startup discovery and of on-demand lookups.
    pub discovery_window: Duration,
    pub retry_policy: RetryPolicy,
    pub subscription_ttl: Option<Duration>,
}

impl Default for ServerConfig {
    /// | Field             | Default        |
    /// |-------------------|----------------|
    /// | http_addr         | `0.0.0.0:8080` |
    /// | discovery_window  | 1 second       |
    /// | retry_policy      | 3 × 1 second   |
    /// | subscription_ttl  | 60 seconds     |
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            discovery_window: Duration::from_secs(1),
            retry_policy: RetryPolicy::default(),
            subscription_ttl: Some(Duration::from_secs(60)),
        }
    }
}

impl ServerConfig {
    /// Derives the server settings from the shared configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAddress`] if `http.bind_address` is not
    /// an IPv4 address.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, ConfigError> {
        let ip: IpAddr = config
            .http
            .bind_address
            .parse()
            .map_err(|_| ConfigError::InvalidAddress {
                field: "http.bind_address",
                value: config.http.bind_address.clone(),
            })?;

        Ok(Self {
            http_addr: SocketAddr::new(ip, config.http.port),
            discovery_window: config.discovery_window(),
            retry_policy: config.retry_policy(),
            subscription_ttl: config.subscription_ttl(),
        })
    }
}

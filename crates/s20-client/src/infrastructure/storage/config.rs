//! TOML configuration for the S20 tools.
//!
//! The default file lives in the platform config directory:
//! - Linux:   `$XDG_CONFIG_HOME/orvibo-s20/config.toml` (or `~/.config/...`)
//! - macOS:   `~/Library/Application Support/OrviboS20/config.toml`
//! - Windows: `%APPDATA%\OrviboS20\config.toml`
//!
//! Every field has a default, so an empty or missing file is a valid
//! configuration:
//!
//! ```toml
//! [general]
//! log_level = "debug"
//!
//! [protocol]
//! retries = 5
//! timeout_ms = 500
//! subscription_ttl_secs = 60
//!
//! [http]
//! port = 8080
//! ```
//!
//! Command-line flags override values loaded from the file.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use s20_core::protocol::messages::DEFAULT_PORT;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::exchange::RetryPolicy;
use crate::infrastructure::transport::TransportConfig;

/// Error type for configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// An address field does not hold an IPv4 address.
    #[error("invalid {field} {value:?}: expected an IPv4 address")]
    InvalidAddress { field: &'static str, value: String },

    /// A value is outside its permitted range.
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub protocol: ProtocolConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralConfig {
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// UDP protocol settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProtocolConfig {
    /// Port the plugs listen on.
    #[serde(default = "default_device_port")]
    pub port: u16,
    /// Local UDP port; `0` lets the OS choose.
    #[serde(default)]
    pub local_port: u16,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_broadcast_address")]
    pub broadcast_address: String,
    /// Sends per exchange before giving up.
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Wait for a reply after each send.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// How long discovery collects announcements.
    #[serde(default = "default_discovery_window_ms")]
    pub discovery_window_ms: u64,
    /// Age after which a subscription is renewed; `0` never renews.
    #[serde(default = "default_subscription_ttl_secs")]
    pub subscription_ttl_secs: u64,
}

/// Settings for the `s20-http` server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HttpConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_device_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_broadcast_address() -> String {
    "255.255.255.255".to_string()
}
fn default_retries() -> u32 {
    3
}
fn default_timeout_ms() -> u64 {
    1000
}
fn default_discovery_window_ms() -> u64 {
    1000
}
fn default_subscription_ttl_secs() -> u64 {
    60
}
fn default_http_port() -> u16 {
    8080
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            port: default_device_port(),
            local_port: 0,
            bind_address: default_bind_address(),
            broadcast_address: default_broadcast_address(),
            retries: default_retries(),
            timeout_ms: default_timeout_ms(),
            discovery_window_ms: default_discovery_window_ms(),
            subscription_ttl_secs: default_subscription_ttl_secs(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_http_port(),
        }
    }
}

// ── Derived settings ──────────────────────────────────────────────────────────

impl AppConfig {
    /// Checks ranges and addresses that serde cannot.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAddress`] or [`ConfigError::Invalid`]
    /// naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        parse_ipv4("protocol.bind_address", &self.protocol.bind_address)?;
        parse_ipv4("protocol.broadcast_address", &self.protocol.broadcast_address)?;
        parse_ipv4("http.bind_address", &self.http.bind_address)?;

        if self.protocol.port == 0 {
            return Err(invalid("protocol.port", "must not be 0"));
        }
        if self.protocol.retries == 0 {
            return Err(invalid("protocol.retries", "at least one attempt is required"));
        }
        if self.protocol.timeout_ms == 0 {
            return Err(invalid("protocol.timeout_ms", "must be positive"));
        }
        if self.protocol.discovery_window_ms == 0 {
            return Err(invalid("protocol.discovery_window_ms", "must be positive"));
        }
        Ok(())
    }

    /// Socket settings for [`crate::infrastructure::transport::UdpTransport`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAddress`] for unparsable addresses.
    pub fn transport_config(&self) -> Result<TransportConfig, ConfigError> {
        Ok(TransportConfig {
            bind_address: parse_ipv4("protocol.bind_address", &self.protocol.bind_address)?,
            local_port: self.protocol.local_port,
            device_port: self.protocol.port,
            broadcast_address: parse_ipv4(
                "protocol.broadcast_address",
                &self.protocol.broadcast_address,
            )?,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.protocol.retries,
            attempt_timeout: Duration::from_millis(self.protocol.timeout_ms),
        }
    }

    pub fn discovery_window(&self) -> Duration {
        Duration::from_millis(self.protocol.discovery_window_ms)
    }

    /// `None` when subscriptions never expire client-side.
    pub fn subscription_ttl(&self) -> Option<Duration> {
        match self.protocol.subscription_ttl_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

fn parse_ipv4(field: &'static str, value: &str) -> Result<Ipv4Addr, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidAddress {
        field,
        value: value.to_string(),
    })
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Resolves the default config file path.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot
/// be determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join("config.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads and validates the configuration.
///
/// With `Some(path)` the file must exist.  With `None` the platform default
/// path is used, and a missing file yields [`AppConfig::default()`].
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors, [`ConfigError::Parse`]
/// for malformed TOML, and the validation errors of [`AppConfig::validate`].
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let cfg = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            toml::from_str(&content)?
        }
        None => {
            let path = match config_file_path() {
                Ok(path) => path,
                Err(ConfigError::NoPlatformConfigDir) => return Ok(AppConfig::default()),
                Err(e) => return Err(e),
            };
            match std::fs::read_to_string(&path) {
                Ok(content) => toml::from_str(&content)?,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => AppConfig::default(),
                Err(e) => return Err(ConfigError::Io { path, source: e }),
            }
        }
    };
    cfg.validate()?;
    Ok(cfg)
}

/// Resolves the platform config directory including the app subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("OrviboS20"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("OrviboS20")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("orvibo-s20"))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config(content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("s20-config-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, content).expect("write temp config");
        path
    }

    // ── Defaults ──────────────────────────────────────────────────────────────

    #[test]
    fn test_app_config_default_matches_protocol_constants() {
        // Arrange / Act
        let cfg = AppConfig::default();

        // Assert
        assert_eq!(cfg.protocol.port, 10000);
        assert_eq!(cfg.protocol.retries, 3);
        assert_eq!(cfg.protocol.timeout_ms, 1000);
        assert_eq!(cfg.protocol.discovery_window_ms, 1000);
        assert_eq!(cfg.protocol.subscription_ttl_secs, 60);
        assert_eq!(cfg.general.log_level, "info");
        assert_eq!(cfg.http.port, 8080);
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_retry_policy_reflects_protocol_section() {
        let mut cfg = AppConfig::default();
        cfg.protocol.retries = 5;
        cfg.protocol.timeout_ms = 250;

        let policy = cfg.retry_policy();

        assert_eq!(policy.attempts, 5);
        assert_eq!(policy.attempt_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_subscription_ttl_zero_means_never() {
        let mut cfg = AppConfig::default();
        assert_eq!(cfg.subscription_ttl(), Some(Duration::from_secs(60)));

        cfg.protocol.subscription_ttl_secs = 0;
        assert_eq!(cfg.subscription_ttl(), None);
    }

    #[test]
    fn test_transport_config_parses_addresses() {
        // Arrange
        let mut cfg = AppConfig::default();
        cfg.protocol.broadcast_address = "192.168.1.255".to_string();
        cfg.protocol.local_port = 10000;

        // Act
        let transport = cfg.transport_config().expect("valid addresses");

        // Assert
        assert_eq!(transport.broadcast_address, Ipv4Addr::new(192, 168, 1, 255));
        assert_eq!(transport.bind_address, Ipv4Addr::UNSPECIFIED);
        assert_eq!(transport.local_port, 10000);
        assert_eq!(transport.device_port, 10000);
    }

    // ── Validation ────────────────────────────────────────────────────────────

    #[test]
    fn test_validate_rejects_bad_broadcast_address() {
        let mut cfg = AppConfig::default();
        cfg.protocol.broadcast_address = "not-an-ip".to_string();

        let result = cfg.validate();

        assert!(matches!(
            result,
            Err(ConfigError::InvalidAddress { field: "protocol.broadcast_address", .. })
        ));
    }

    #[test]
    fn test_validate_rejects_zero_retries() {
        let mut cfg = AppConfig::default();
        cfg.protocol.retries = 0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid { field: "protocol.retries", .. })
        ));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut cfg = AppConfig::default();
        cfg.protocol.timeout_ms = 0;
        assert!(cfg.validate().is_err());
    }

    // ── TOML parsing ──────────────────────────────────────────────────────────

    #[test]
    fn test_deserialize_empty_toml_uses_defaults() {
        let cfg: AppConfig = toml::from_str("").expect("deserialize empty");
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_deserialize_partial_protocol_overrides_defaults() {
        // Arrange
        let toml_str = r#"
[protocol]
retries = 7
"#;

        // Act
        let cfg: AppConfig = toml::from_str(toml_str).expect("deserialize partial");

        // Assert
        assert_eq!(cfg.protocol.retries, 7);
        // Unspecified fields keep their defaults
        assert_eq!(cfg.protocol.timeout_ms, 1000);
        assert_eq!(cfg.http.port, 8080);
    }

    #[test]
    fn test_app_config_serializes_and_deserializes_round_trip() {
        let mut cfg = AppConfig::default();
        cfg.general.log_level = "debug".to_string();
        cfg.http.port = 9000;

        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let restored: AppConfig = toml::from_str(&toml_str).expect("deserialize");

        assert_eq!(cfg, restored);
    }

    // ── load_config ───────────────────────────────────────────────────────────

    #[test]
    fn test_load_config_reads_explicit_file() {
        // Arrange
        let path = temp_config("[protocol]\ntimeout_ms = 300\n");

        // Act
        let cfg = load_config(Some(&path)).expect("load");
        std::fs::remove_file(&path).ok();

        // Assert
        assert_eq!(cfg.protocol.timeout_ms, 300);
    }

    #[test]
    fn test_load_config_missing_explicit_file_is_io_error() {
        let path = std::env::temp_dir().join(format!("s20-missing-{}.toml", uuid::Uuid::new_v4()));
        assert!(matches!(load_config(Some(&path)), Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_load_config_invalid_toml_is_parse_error() {
        let path = temp_config("[[[ not valid toml");

        let result = load_config(Some(&path));
        std::fs::remove_file(&path).ok();

        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_runs_validation() {
        let path = temp_config("[http]\nbind_address = \"localhost\"\n");

        let result = load_config(Some(&path));
        std::fs::remove_file(&path).ok();

        assert!(matches!(result, Err(ConfigError::InvalidAddress { .. })));
    }
}

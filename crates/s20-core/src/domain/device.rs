//! Device identity: hardware ids, device types, and the [`Device`] record.
//!
//! A plug is identified by its 6-byte hardware id (the MAC of its WiFi
//! module).  The id is the key for deduplicating discovery results and for
//! tracking subscriptions; the IP address may change between discoveries.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::messages::{AnnounceMessage, DEFAULT_PORT};

/// Length of a hardware id in bytes.
pub const HARDWARE_ID_LEN: usize = 6;

/// Errors raised while building device records.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeviceError {
    /// The announcement decoded fine but names a device family we cannot drive.
    #[error("unsupported device type: {0:?}")]
    UnsupportedDevice(String),

    /// A hardware id string could not be parsed.
    #[error("invalid hardware id {input:?}: {reason}")]
    InvalidHardwareId { input: String, reason: String },
}

// ── HardwareId ────────────────────────────────────────────────────────────────

/// Fixed-length hardware identifier of a plug.
///
/// Formats as lower-case colon-separated hex (`ac:cf:23:12:34:56`).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HardwareId([u8; HARDWARE_ID_LEN]);

impl HardwareId {
    pub const fn new(bytes: [u8; HARDWARE_ID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; HARDWARE_ID_LEN] {
        &self.0
    }

    /// The id with its byte order reversed, as the firmware expects it in
    /// the second id field of a subscription.
    pub fn reversed(&self) -> Self {
        let mut bytes = self.0;
        bytes.reverse();
        Self(bytes)
    }
}

impl fmt::Display for HardwareId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl fmt::Debug for HardwareId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HardwareId({self})")
    }
}

/// Accepts `ac:cf:23:12:34:56`, `AC-CF-23-12-34-56`, or `accf23123456`.
impl FromStr for HardwareId {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| DeviceError::InvalidHardwareId {
            input: s.to_string(),
            reason: reason.to_string(),
        };

        let hex: String = s.chars().filter(|c| *c != ':' && *c != '-').collect();
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid("not hexadecimal"));
        }
        if hex.len() != HARDWARE_ID_LEN * 2 {
            return Err(invalid("expected 12 hex digits"));
        }

        let mut bytes = [0u8; HARDWARE_ID_LEN];
        for (i, byte) in bytes.iter_mut().enumerate() {
            let pair = &hex[i * 2..i * 2 + 2];
            *byte = u8::from_str_radix(pair, 16).map_err(|_| invalid("not hexadecimal"))?;
        }
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for HardwareId {
    type Error = DeviceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HardwareId> for String {
    fn from(id: HardwareId) -> Self {
        id.to_string()
    }
}

// ── DeviceType ────────────────────────────────────────────────────────────────

/// Device families this client can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceType {
    /// Orvibo S20 WiFi smart socket, type code `SOC002`.
    SmartSocket,
}

impl DeviceType {
    /// Maps the 6-byte ASCII type code of an announcement to a device type.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::UnsupportedDevice`] for any other code
    /// (e.g. `IRD005`, the AllOne IR blaster).
    pub fn from_code(code: &[u8; 6]) -> Result<Self, DeviceError> {
        match code {
            b"SOC002" => Ok(DeviceType::SmartSocket),
            other => Err(DeviceError::UnsupportedDevice(
                String::from_utf8_lossy(other).into_owned(),
            )),
        }
    }

    /// The wire type code.
    pub fn code(&self) -> &'static [u8; 6] {
        match self {
            DeviceType::SmartSocket => b"SOC002",
        }
    }
}

// ── Device ────────────────────────────────────────────────────────────────────

/// A plug on the local network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub address: Ipv4Addr,
    pub hardware_id: HardwareId,
    pub device_type: DeviceType,
    /// Power state reported in the last announcement, if the device came
    /// from discovery.  Informational only; always query the plug for the
    /// current state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub announced_on: Option<bool>,
}

impl Device {
    /// Builds a device for a caller that already knows address and id.
    pub fn new(address: Ipv4Addr, hardware_id: HardwareId) -> Self {
        Self {
            address,
            hardware_id,
            device_type: DeviceType::SmartSocket,
            announced_on: None,
        }
    }

    /// Builds a device from a decoded announcement received from `address`.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::UnsupportedDevice`] if the announcement names
    /// a device type other than the S20 socket.
    pub fn from_announcement(
        address: Ipv4Addr,
        msg: &AnnounceMessage,
    ) -> Result<Self, DeviceError> {
        Ok(Self {
            address,
            hardware_id: msg.hardware_id,
            device_type: DeviceType::from_code(&msg.device_type)?,
            announced_on: Some(msg.on),
        })
    }

    /// Socket address of the plug on the default protocol port.
    pub fn socket_addr(&self) -> SocketAddr {
        self.socket_addr_on(DEFAULT_PORT)
    }

    /// Socket address of the plug on `port`.
    pub fn socket_addr_on(&self, port: u16) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.address, port))
    }
}

//! JSON bodies returned by the HTTP front end.
//!
//! ```json
//! {"address":"192.168.1.40","hardware_id":"ac:cf:23:12:34:56","state":"ON"}
//! {"error":"device ac:cf:23:12:34:56 at 192.168.1.40 is unreachable"}
//! ```
//!
//! Bodies never carry retry counts or raw packet bytes.

use std::net::Ipv4Addr;

use s20_core::{Device, HardwareId};
use serde::{Deserialize, Serialize};

/// Relay state as it appears in JSON: `"ON"` or `"OFF"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PowerState {
    On,
    Off,
}

impl From<bool> for PowerState {
    fn from(on: bool) -> Self {
        if on {
            PowerState::On
        } else {
            PowerState::Off
        }
    }
}

/// Success body of `/STATUS`, `/ON`, and `/OFF`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlugStateResponse {
    pub address: Ipv4Addr,
    pub hardware_id: HardwareId,
    pub state: PowerState,
}

impl PlugStateResponse {
    pub fn new(device: &Device, on: bool) -> Self {
        Self {
            address: device.address,
            hardware_id: device.hardware_id,
            state: on.into(),
        }
    }
}

/// One entry of the `/devices` listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEntry {
    pub address: Ipv4Addr,
    pub hardware_id: HardwareId,
    /// State from the plug's last announcement; absent for plugs that were
    /// located rather than discovered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub announced_state: Option<PowerState>,
}

impl From<&Device> for DeviceEntry {
    fn from(device: &Device) -> Self {
        Self {
            address: device.address,
            hardware_id: device.hardware_id,
            announced_state: device.announced_on.map(PowerState::from),
        }
    }
}

/// Body of every failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

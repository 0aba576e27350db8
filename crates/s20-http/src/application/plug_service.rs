//! Plug operations behind the HTTP routes.
//!
//! [`PlugService`] owns the transport, the device controller, and the table
//! of known plugs.  All three sit behind one `tokio::sync::Mutex`, so requests
//! are served one at a time and no two exchanges ever share the socket.
//!
//! Plugs are looked up by address.  The table is filled by a discovery run
//! at startup; an address that is not in it is resolved on demand with a
//! targeted lookup and added.

use std::net::Ipv4Addr;

use s20_client::{
    discover, locate, ControlError, DeviceController, DiscoveryError, DiscoveryResult, Transport,
};
use s20_core::Device;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

use crate::domain::{DeviceEntry, PlugStateResponse, ServerConfig};

/// Failures of a plug operation, as seen by the HTTP layer.
#[derive(Debug, Error)]
pub enum PlugServiceError {
    /// The path segment is not an IPv4 address.
    #[error("invalid address {0:?}")]
    InvalidAddress(String),

    /// No plug answered from the address.
    #[error("no S20 plug found at {0}")]
    NotFound(Ipv4Addr),

    #[error(transparent)]
    Control(#[from] ControlError),

    #[error("discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),
}

struct Inner<T> {
    transport: T,
    controller: DeviceController,
    devices: DiscoveryResult,
}

/// Serialized access to the plugs on the local network.
pub struct PlugService<T> {
    inner: Mutex<Inner<T>>,
    config: ServerConfig,
}

impl<T: Transport> PlugService<T> {
    pub fn new(transport: T, config: ServerConfig) -> Self {
        let controller = DeviceController::new(config.retry_policy, config.subscription_ttl);
        Self {
            inner: Mutex::new(Inner {
                transport,
                controller,
                devices: DiscoveryResult::default(),
            }),
            config,
        }
    }

    /// Runs discovery and merges the result into the device table.  Returns
    /// the number of plugs that answered.
    ///
    /// # Errors
    ///
    /// Returns [`PlugServiceError::Discovery`] if the socket fails.
    pub async fn refresh_devices(&self) -> Result<usize, PlugServiceError> {
        let mut inner = self.inner.lock().await;
        let window = self.config.discovery_window;
        let found = discover(&inner.transport, window, self.probes()).await?;
        let count = found.len();
        inner.devices.extend(found.into_devices());
        info!("{count} plug(s) answered discovery, {} known", inner.devices.len());
        Ok(count)
    }

    /// Known plugs, ordered by address.
    pub async fn devices(&self) -> Vec<DeviceEntry> {
        let inner = self.inner.lock().await;
        inner
            .devices
            .clone()
            .into_devices()
            .iter()
            .map(DeviceEntry::from)
            .collect()
    }

    /// Queries the relay state of the plug at `address`.
    ///
    /// # Errors
    ///
    /// See [`PlugServiceError`].
    pub async fn status(&self, address: &str) -> Result<PlugStateResponse, PlugServiceError> {
        let ip = parse_address(address)?;
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        let device = self.resolve(inner, ip).await?;
        let on = inner.controller.get_state(&inner.transport, &device).await?;
        Ok(PlugStateResponse::new(&device, on))
    }

    /// Switches the plug at `address` and reports the requested state.
    ///
    /// # Errors
    ///
    /// See [`PlugServiceError`].
    pub async fn switch(
        &self,
        address: &str,
        on: bool,
    ) -> Result<PlugStateResponse, PlugServiceError> {
        let ip = parse_address(address)?;
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        let device = self.resolve(inner, ip).await?;
        inner.controller.set_state(&inner.transport, &device, on).await?;
        Ok(PlugStateResponse::new(&device, on))
    }

    /// Discovery probes per window; one per attempt of the retry policy.
    fn probes(&self) -> u32 {
        self.config.retry_policy.attempts
    }

    async fn resolve(
        &self,
        inner: &mut Inner<T>,
        ip: Ipv4Addr,
    ) -> Result<Device, PlugServiceError> {
        if let Some(device) = inner.devices.find_by_address(ip) {
            return Ok(device.clone());
        }
        let device = locate(&inner.transport, ip, self.config.discovery_window, self.probes())
            .await?
            .ok_or(PlugServiceError::NotFound(ip))?;
        inner.devices.insert(device.clone());
        Ok(device)
    }
}

fn parse_address(address: &str) -> Result<Ipv4Addr, PlugServiceError> {
    address
        .parse()
        .map_err(|_| PlugServiceError::InvalidAddress(address.to_string()))
}

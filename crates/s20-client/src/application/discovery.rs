//! Broadcast discovery of S20 plugs.
//!
//! The listening window is split into `probes` equal slices and a probe is
//! broadcast on the plugs' port at the start of each, so one lost probe or
//! announcement does not hide a plug.  The S20 answers every probe it sees;
//! the repeated announcements collapse into one entry per hardware id.
//!
//! Anything that is not an announcement from a supported device is skipped:
//! malformed frames, our own probe echoed by the broadcast socket, and
//! announcements from other Orvibo products.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use s20_core::{decode_message, encode_message, Device, HardwareId, ProtocolError, S20Message};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::infrastructure::transport::{Transport, TransportError};

/// Error type for discovery.  Silence is not an error; only a failing socket
/// is.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("failed to encode discovery probe: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Plugs found by one discovery run, keyed by hardware id.
///
/// A plug that announces twice appears once; the most recent announcement's
/// address wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryResult {
    devices: HashMap<HardwareId, Device>,
}

impl DiscoveryResult {
    /// Inserts or replaces the entry for `device.hardware_id`.  Returns `true`
    /// if the id was not known before.
    pub fn insert(&mut self, device: Device) -> bool {
        self.devices.insert(device.hardware_id, device).is_none()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn get(&self, hardware_id: &HardwareId) -> Option<&Device> {
        self.devices.get(hardware_id)
    }

    pub fn find_by_address(&self, address: Ipv4Addr) -> Option<&Device> {
        self.devices.values().find(|d| d.address == address)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    /// The devices ordered by address, then hardware id.
    pub fn into_devices(self) -> Vec<Device> {
        let mut devices: Vec<Device> = self.devices.into_values().collect();
        devices.sort_by_key(|d| (d.address, d.hardware_id));
        devices
    }
}

impl Extend<Device> for DiscoveryResult {
    fn extend<I: IntoIterator<Item = Device>>(&mut self, iter: I) {
        for device in iter {
            self.insert(device);
        }
    }
}

/// Broadcasts up to `probes` probes and collects every announcement
/// received within `window`.
///
/// # Errors
///
/// Returns [`DiscoveryError::Transport`] if the socket fails.  No responders
/// yields an empty result.
pub async fn discover<T: Transport + ?Sized>(
    transport: &T,
    window: Duration,
    probes: u32,
) -> Result<DiscoveryResult, DiscoveryError> {
    let mut result = DiscoveryResult::default();
    collect_announcements(transport, window, probes, |device| {
        if result.insert(device.clone()) {
            debug!("discovered {} at {}", device.hardware_id, device.address);
        }
        false
    })
    .await?;

    info!("discovery found {} plug(s)", result.len());
    Ok(result)
}

/// Learns the hardware id of the plug at `address`.
///
/// Probes like [`discover`] and returns as soon as that plug announces
/// itself, or `None` once `window` elapses without it.
///
/// # Errors
///
/// Returns [`DiscoveryError::Transport`] if the socket fails.
pub async fn locate<T: Transport + ?Sized>(
    transport: &T,
    address: Ipv4Addr,
    window: Duration,
    probes: u32,
) -> Result<Option<Device>, DiscoveryError> {
    let mut found = None;
    collect_announcements(transport, window, probes, |device| {
        if device.address == address {
            found = Some(device);
            true
        } else {
            false
        }
    })
    .await?;

    match &found {
        Some(device) => info!("located {} at {address}", device.hardware_id),
        None => info!("no plug answered from {address}"),
    }
    Ok(found)
}

/// Probe-and-listen loop shared by [`discover`] and [`locate`].
///
/// `on_device` returns `true` to stop listening early.
async fn collect_announcements<T, F>(
    transport: &T,
    window: Duration,
    probes: u32,
    mut on_device: F,
) -> Result<(), DiscoveryError>
where
    T: Transport + ?Sized,
    F: FnMut(Device) -> bool,
{
    let probe = encode_message(&S20Message::DiscoverProbe)?;
    let probes = probes.max(1);
    let slice = window / probes;
    let deadline = Instant::now() + window;

    for round in 1..=probes {
        transport.broadcast(&probe).await?;
        debug!("discovery probe {round}/{probes} sent");

        let slice_end = if round == probes {
            deadline
        } else {
            (Instant::now() + slice).min(deadline)
        };
        if listen_until(transport, slice_end, &mut on_device).await? {
            return Ok(());
        }
    }
    Ok(())
}

/// Receives announcements until `until`.  Returns `true` once `on_device`
/// asks to stop.
async fn listen_until<T, F>(
    transport: &T,
    until: Instant,
    on_device: &mut F,
) -> Result<bool, DiscoveryError>
where
    T: Transport + ?Sized,
    F: FnMut(Device) -> bool,
{
    loop {
        let remaining = until.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(false);
        }

        let (bytes, source) = match transport.receive(remaining).await {
            Ok(datagram) => datagram,
            Err(e) if e.is_timeout() => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        let SocketAddr::V4(source_v4) = source else {
            debug!("ignoring datagram from non-IPv4 source {source}");
            continue;
        };

        match decode_message(&bytes) {
            Ok(S20Message::DiscoverAnnounce(announce)) => {
                match Device::from_announcement(*source_v4.ip(), &announce) {
                    Ok(device) => {
                        if on_device(device) {
                            return Ok(true);
                        }
                    }
                    Err(e) => debug!("skipping announcement from {source}: {e}"),
                }
            }
            Ok(other) => debug!("ignoring {} from {source} during discovery", other.name()),
            Err(e) => debug!("discarding malformed datagram from {source}: {e}"),
        }
    }
}

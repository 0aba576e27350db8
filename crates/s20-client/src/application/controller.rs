//! Reading and switching a plug's relay.
//!
//! The plug reports its relay state only in a subscription acknowledgment,
//! so a state query is a subscribe exchange: it renews the session and
//! returns the state in one round trip.  A state change needs a live
//! subscription first and is then confirmed by a control acknowledgment.
//!
//! Nothing is cached: every call talks to the plug.

use std::net::Ipv4Addr;
use std::time::Duration;

use s20_core::protocol::messages::ControlMessage;
use s20_core::{Device, HardwareId, ProtocolError, S20Message};
use thiserror::Error;
use tracing::{info, warn};

use crate::application::exchange::{exchange, ExchangeError, RetryPolicy};
use crate::application::session_manager::{SessionError, SessionManager};
use crate::infrastructure::transport::{Transport, TransportError};

/// Terminal failures of a device operation.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The plug did not answer within the retry budget.
    #[error("device {hardware_id} at {address} is unreachable")]
    DeviceUnreachable {
        address: Ipv4Addr,
        hardware_id: HardwareId,
    },

    /// The plug answered but never acknowledged the subscription.
    #[error("device {hardware_id} at {address} refused the subscription")]
    SubscriptionFailed {
        address: Ipv4Addr,
        hardware_id: HardwareId,
    },

    #[error("malformed packet: {0}")]
    MalformedPacket(#[from] ProtocolError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ControlError {
    fn from_session(err: SessionError, device: &Device) -> Self {
        match err {
            SessionError::SubscriptionFailed {
                device_responded: false,
                ..
            } => ControlError::DeviceUnreachable {
                address: device.address,
                hardware_id: device.hardware_id,
            },
            SessionError::SubscriptionFailed { .. } => ControlError::SubscriptionFailed {
                address: device.address,
                hardware_id: device.hardware_id,
            },
            SessionError::Transport(e) => ControlError::Transport(e),
            SessionError::Protocol(e) => ControlError::MalformedPacket(e),
        }
    }
}

/// Gets and sets plug power state, subscribing as needed.
///
/// Operations take `&mut self`, so two commands can never interleave on the
/// same controller.
#[derive(Debug)]
pub struct DeviceController {
    sessions: SessionManager,
}

impl DeviceController {
    pub fn new(policy: RetryPolicy, subscription_ttl: Option<Duration>) -> Self {
        Self {
            sessions: SessionManager::new(policy, subscription_ttl),
        }
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn sessions_mut(&mut self) -> &mut SessionManager {
        &mut self.sessions
    }

    /// Asks the plug whether its relay is on.
    ///
    /// # Errors
    ///
    /// [`ControlError::DeviceUnreachable`] if the plug stays silent,
    /// [`ControlError::SubscriptionFailed`] if it answers with anything but
    /// an acknowledgment.
    pub async fn get_state<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
        device: &Device,
    ) -> Result<bool, ControlError> {
        let on = self
            .sessions
            .subscribe(transport, device)
            .await
            .map_err(|e| ControlError::from_session(e, device))?;
        info!("{} at {} is {}", device.hardware_id, device.address, on_off(on));
        Ok(on)
    }

    /// Switches the relay.
    ///
    /// Any control acknowledgment from the plug counts as success, even one
    /// that reports a different state.
    ///
    /// # Errors
    ///
    /// [`ControlError::DeviceUnreachable`] if the plug does not acknowledge;
    /// the session is dropped so the next call subscribes again.
    pub async fn set_state<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
        device: &Device,
        on: bool,
    ) -> Result<(), ControlError> {
        self.sessions
            .ensure_subscribed(transport, device)
            .await
            .map_err(|e| ControlError::from_session(e, device))?;

        let hardware_id = device.hardware_id;
        let request = S20Message::ControlRequest(ControlMessage { hardware_id, on });
        let outcome = exchange(
            transport,
            device.socket_addr_on(transport.device_port()),
            &request,
            self.sessions.policy(),
            |msg| match msg {
                S20Message::ControlAck(ack) if ack.hardware_id == hardware_id => Some(ack.on),
                _ => None,
            },
        )
        .await;

        match outcome {
            Ok(acked) => {
                if acked != on {
                    warn!(
                        "{hardware_id} acknowledged {} after being switched {}",
                        on_off(acked),
                        on_off(on)
                    );
                }
                info!("switched {hardware_id} at {} {}", device.address, on_off(on));
                Ok(())
            }
            Err(ExchangeError::Exhausted { .. }) => {
                self.sessions.record_timeout(device);
                Err(ControlError::DeviceUnreachable {
                    address: device.address,
                    hardware_id,
                })
            }
            Err(ExchangeError::Transport(e)) => Err(e.into()),
            Err(ExchangeError::Protocol(e)) => Err(e.into()),
        }
    }

    pub async fn turn_on<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
        device: &Device,
    ) -> Result<(), ControlError> {
        self.set_state(transport, device, true).await
    }

    pub async fn turn_off<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
        device: &Device,
    ) -> Result<(), ControlError> {
        self.set_state(transport, device, false).await
    }
}

/// `"ON"` / `"OFF"`, as printed by the front ends.
pub fn on_off(on: bool) -> &'static str {
    if on {
        "ON"
    } else {
        "OFF"
    }
}

//! Subscription handshakes and per-device session tracking.
//!
//! The S20 only obeys a client that subscribed recently.  A subscribe request
//! carries the hardware id, padding, the reversed id, and padding again; the
//! plug answers with an acknowledgment that also reports its relay state.
//!
//! The [`SessionManager`] owns one [`Session`] per hardware id.  Sessions are
//! created lazily and are never shared between devices.

use std::collections::HashMap;
use std::time::Duration;

use s20_core::protocol::messages::SubscribeRequestMessage;
use s20_core::{Device, HardwareId, ProtocolError, S20Message, Session, SessionState};
use thiserror::Error;
use tracing::{info, warn};

use crate::application::exchange::{exchange, ExchangeError, RetryPolicy};
use crate::infrastructure::transport::{Transport, TransportError};

/// Error type for subscription handshakes.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The retry budget ran out without a subscribe acknowledgment.
    #[error("subscription to {hardware_id} failed after {attempts} attempts")]
    SubscriptionFailed {
        hardware_id: HardwareId,
        attempts: u32,
        /// The plug sent datagrams, but none acknowledged the subscription.
        device_responded: bool,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Tracks the subscription state of every device the client talks to.
#[derive(Debug)]
pub struct SessionManager {
    sessions: HashMap<HardwareId, Session>,
    policy: RetryPolicy,
    ttl: Option<Duration>,
}

impl SessionManager {
    /// `ttl` is the age after which a subscription is renewed before the
    /// next command; `None` keeps subscriptions until a timeout demotes them.
    pub fn new(policy: RetryPolicy, ttl: Option<Duration>) -> Self {
        Self {
            sessions: HashMap::new(),
            policy,
            ttl,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Stored state of the device's session; `Unsubscribed` if none exists.
    pub fn session_state(&self, device: &Device) -> SessionState {
        self.sessions
            .get(&device.hardware_id)
            .map_or(SessionState::Unsubscribed, Session::state)
    }

    /// `true` if a command may be sent to `device` without subscribing first.
    pub fn is_subscribed(&self, device: &Device) -> bool {
        self.sessions
            .get(&device.hardware_id)
            .is_some_and(|s| s.is_active(now(), self.ttl))
    }

    /// Subscribes unless a fresh subscription already exists.
    ///
    /// # Errors
    ///
    /// See [`SessionManager::subscribe`].
    pub async fn ensure_subscribed<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
        device: &Device,
    ) -> Result<(), SessionError> {
        if self.is_subscribed(device) {
            return Ok(());
        }
        if self.session_state(device) == SessionState::Subscribed {
            info!("subscription to {} expired, renewing", device.hardware_id);
        }
        self.subscribe(transport, device).await.map(|_| ())
    }

    /// Performs the subscribe handshake unconditionally and returns the relay
    /// state reported in the acknowledgment.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::SubscriptionFailed`] once the retry budget is
    /// spent, leaving the session `Unsubscribed`, and
    /// [`SessionError::Transport`] if the socket fails.
    pub async fn subscribe<T: Transport + ?Sized>(
        &mut self,
        transport: &T,
        device: &Device,
    ) -> Result<bool, SessionError> {
        let hardware_id = device.hardware_id;
        self.session_mut(hardware_id).begin_subscribe();

        let request = S20Message::SubscribeRequest(SubscribeRequestMessage { hardware_id });
        let outcome = exchange(
            transport,
            device.socket_addr_on(transport.device_port()),
            &request,
            &self.policy,
            |msg| match msg {
                S20Message::SubscribeAck(ack) if ack.hardware_id == hardware_id => Some(ack.on),
                _ => None,
            },
        )
        .await;

        match outcome {
            Ok(on) => {
                self.session_mut(hardware_id).confirm(now());
                info!("subscribed to {hardware_id} at {}", device.address);
                Ok(on)
            }
            Err(e) => {
                self.session_mut(hardware_id).abandon();
                match e {
                    ExchangeError::Exhausted {
                        attempts,
                        device_responded,
                    } => {
                        warn!(
                            "subscription to {hardware_id} at {} failed after {attempts} attempts",
                            device.address
                        );
                        Err(SessionError::SubscriptionFailed {
                            hardware_id,
                            attempts,
                            device_responded,
                        })
                    }
                    ExchangeError::Transport(e) => Err(e.into()),
                    ExchangeError::Protocol(e) => Err(e.into()),
                }
            }
        }
    }

    /// Drops the device's subscription; the next command re-subscribes.
    pub fn invalidate(&mut self, device: &Device) {
        if let Some(session) = self.sessions.get_mut(&device.hardware_id) {
            session.invalidate();
        }
    }

    /// Demotes the session after a command to the device went unanswered.
    pub fn record_timeout(&mut self, device: &Device) {
        warn!(
            "{} at {} stopped answering, dropping subscription",
            device.hardware_id, device.address
        );
        self.invalidate(device);
    }

    fn session_mut(&mut self, hardware_id: HardwareId) -> &mut Session {
        self.sessions
            .entry(hardware_id)
            .or_insert_with(|| Session::new(hardware_id))
    }
}

/// Current time on the tokio clock, so paused-clock tests can age sessions.
fn now() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}

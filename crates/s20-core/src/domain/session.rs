//! Per-device subscription state machine.
//!
//! The S20 ignores control and query commands from a client that has not
//! subscribed recently.  A [`Session`] records where the client stands with
//! one plug:
//!
//! ```text
//! Unsubscribed ──begin_subscribe──► Subscribing ──confirm──► Subscribed
//!      ▲                                 │                       │
//!      └────────────── abandon ──────────┘                       │
//!      └──────────── invalidate / timeout / expiry ──────────────┘
//! ```
//!
//! The machine is pure: callers pass the current [`Instant`] so expiry can be
//! tested without a clock.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::domain::device::HardwareId;

/// Subscription state of one plug.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unsubscribed,
    Subscribing,
    Subscribed,
}

/// Subscription bookkeeping for a single hardware id.
#[derive(Debug, Clone)]
pub struct Session {
    hardware_id: HardwareId,
    state: SessionState,
    subscribed_at: Option<Instant>,
}

impl Session {
    /// Creates an unsubscribed session.
    pub fn new(hardware_id: HardwareId) -> Self {
        Self {
            hardware_id,
            state: SessionState::Unsubscribed,
            subscribed_at: None,
        }
    }

    pub fn hardware_id(&self) -> HardwareId {
        self.hardware_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Returns `true` if control commands may be sent at `now`.
    ///
    /// A subscription older than `ttl` no longer counts; the plug forgets
    /// subscribers after a while and re-subscribing is cheap.
    pub fn is_active(&self, now: Instant, ttl: Option<Duration>) -> bool {
        if self.state != SessionState::Subscribed {
            return false;
        }
        match (ttl, self.subscribed_at) {
            (Some(ttl), Some(at)) => now.saturating_duration_since(at) < ttl,
            _ => true,
        }
    }

    /// Enters `Subscribing`. Any previous subscription is dropped.
    pub fn begin_subscribe(&mut self) {
        self.transition(SessionState::Subscribing);
        self.subscribed_at = None;
    }

    /// Records a subscribe acknowledgment received at `now`.
    pub fn confirm(&mut self, now: Instant) {
        self.transition(SessionState::Subscribed);
        self.subscribed_at = Some(now);
    }

    /// The handshake ran out of attempts.
    pub fn abandon(&mut self) {
        self.invalidate();
    }

    /// Drops the subscription, forcing a new handshake before the next command.
    pub fn invalidate(&mut self) {
        self.transition(SessionState::Unsubscribed);
        self.subscribed_at = None;
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            debug!(
                "session {}: {:?} -> {:?}",
                self.hardware_id, self.state, next
            );
        }
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: HardwareId = HardwareId::new([1, 2, 3, 4, 5, 6]);
    const TTL: Option<Duration> = Some(Duration::from_secs(60));

    #[test]
    fn test_new_session_is_unsubscribed() {
        let session = Session::new(ID);
        assert_eq!(session.state(), SessionState::Unsubscribed);
        assert!(!session.is_active(Instant::now(), TTL));
    }

    #[test]
    fn test_full_handshake_reaches_subscribed() {
        // Arrange
        let mut session = Session::new(ID);
        let now = Instant::now();

        // Act
        session.begin_subscribe();
        assert_eq!(session.state(), SessionState::Subscribing);
        session.confirm(now);

        // Assert
        assert_eq!(session.state(), SessionState::Subscribed);
        assert!(session.is_active(now, TTL));
    }

    #[test]
    fn test_subscribing_is_not_active() {
        let mut session = Session::new(ID);
        session.begin_subscribe();
        assert!(!session.is_active(Instant::now(), TTL));
    }

    #[test]
    fn test_abandon_returns_to_unsubscribed() {
        let mut session = Session::new(ID);
        session.begin_subscribe();
        session.abandon();
        assert_eq!(session.state(), SessionState::Unsubscribed);
    }

    #[test]
    fn test_invalidate_demotes_subscribed_session() {
        let mut session = Session::new(ID);
        session.begin_subscribe();
        session.confirm(Instant::now());

        session.invalidate();

        assert_eq!(session.state(), SessionState::Unsubscribed);
        assert!(!session.is_active(Instant::now(), TTL));
    }

    #[test]
    fn test_subscription_expires_after_ttl() {
        // Arrange
        let mut session = Session::new(ID);
        let start = Instant::now();
        session.begin_subscribe();
        session.confirm(start);

        // Act / Assert
        assert!(session.is_active(start + Duration::from_secs(59), TTL));
        assert!(!session.is_active(start + Duration::from_secs(60), TTL));
    }

    #[test]
    fn test_subscription_without_ttl_never_expires() {
        let mut session = Session::new(ID);
        let start = Instant::now();
        session.begin_subscribe();
        session.confirm(start);
        assert!(session.is_active(start + Duration::from_secs(86_400), None));
    }
}

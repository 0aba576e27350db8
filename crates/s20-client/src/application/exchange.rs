//! Request/reply exchange with bounded retries.
//!
//! UDP gives no delivery guarantee and the S20 never retransmits, so every
//! unicast request is sent up to [`RetryPolicy::attempts`] times.  After each
//! send the client waits [`RetryPolicy::attempt_timeout`] for a datagram the
//! caller's `accept` closure recognises as the reply.  Datagrams from other
//! hosts, malformed frames, and replies to something else are discarded and
//! the receive is re-issued against what remains of the attempt's budget.
//!
//! Datagrams already queued when the exchange starts are dropped before the
//! first send.  A reply that arrived after an earlier exchange gave up is
//! never taken as the answer to a new request.

use std::net::SocketAddr;
use std::time::Duration;

use s20_core::{decode_message, encode_message, ProtocolError, S20Message};
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

use crate::infrastructure::transport::{Transport, TransportError};

/// Retry budget of a single exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total sends, including the first.
    pub attempts: u32,
    /// How long to wait for a reply after each send.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            attempt_timeout: Duration::from_secs(1),
        }
    }
}

/// Failure of one exchange.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Every attempt timed out without an acceptable reply.
    #[error("no reply after {attempts} attempts")]
    Exhausted {
        attempts: u32,
        /// At least one datagram arrived from the destination host.
        device_responded: bool,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The request itself could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Sends `request` to `destination` and waits for the reply `accept` picks.
///
/// `accept` sees every well-formed message from the destination host and
/// returns `Some` for the one that answers the request.
///
/// # Errors
///
/// [`ExchangeError::Exhausted`] when the retry budget runs out,
/// [`ExchangeError::Transport`] on socket failures other than timeouts.
pub async fn exchange<T, R, F>(
    transport: &T,
    destination: SocketAddr,
    request: &S20Message,
    policy: &RetryPolicy,
    mut accept: F,
) -> Result<R, ExchangeError>
where
    T: Transport + ?Sized,
    F: FnMut(&S20Message) -> Option<R>,
{
    let frame = encode_message(request)?;
    let stale = transport.discard_pending()?;
    if stale > 0 {
        debug!("dropped {stale} stale datagram(s) before {}", request.name());
    }
    let mut device_responded = false;

    for attempt in 1..=policy.attempts {
        transport.send_to(&frame, destination).await?;
        debug!(
            "{} to {destination} (attempt {attempt}/{})",
            request.name(),
            policy.attempts
        );

        let deadline = Instant::now() + policy.attempt_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            let (bytes, source) = match transport.receive(remaining).await {
                Ok(datagram) => datagram,
                Err(e) if e.is_timeout() => break,
                Err(e) => return Err(e.into()),
            };

            if source.ip() != destination.ip() {
                debug!("ignoring datagram from {source} while waiting on {destination}");
                continue;
            }
            device_responded = true;

            match decode_message(&bytes) {
                Ok(msg) => match accept(&msg) {
                    Some(reply) => return Ok(reply),
                    None => debug!("ignoring unexpected {} from {source}", msg.name()),
                },
                Err(e) => debug!("discarding malformed datagram from {source}: {e}"),
            }
        }
    }

    Err(ExchangeError::Exhausted {
        attempts: policy.attempts,
        device_responded,
    })
}

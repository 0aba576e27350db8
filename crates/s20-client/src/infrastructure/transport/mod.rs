//! UDP transport: timed send/receive and broadcast, with no protocol knowledge.
//!
//! Everything above this layer talks to a [`Transport`] trait object or
//! generic, so the protocol logic runs unchanged against the real socket
//! ([`UdpTransport`]) or the in-memory [`simulated::SimulatedNetwork`].
//!
//! # Socket lifetime
//!
//! A [`UdpTransport`] owns its socket.  Dropping the transport closes the
//! socket, which covers normal return, early `?` returns, and a cancelled
//! future that owned the transport.  Nothing in this crate keeps a socket in
//! a global.

pub mod simulated;

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use s20_core::protocol::messages::DEFAULT_PORT;
use thiserror::Error;
use tokio::net::UdpSocket;
use tracing::{debug, info};

/// Largest datagram we expect from a plug; anything longer is truncated by
/// the OS and then rejected by the codec.
const RECV_BUFFER_SIZE: usize = 1024;

/// Errors produced by a [`Transport`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// The UDP socket could not be bound.
    #[error("failed to bind UDP socket on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// No datagram arrived within the allotted time.
    #[error("no datagram received within {0:?}")]
    ReceiveTimeout(Duration),

    /// Any other socket error.
    #[error("UDP I/O error: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    /// Returns `true` for [`TransportError::ReceiveTimeout`], the expected,
    /// retryable outcome of waiting on a silent plug.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::ReceiveTimeout(_))
    }
}

/// Datagram transport used by discovery, the session manager, and the
/// controller.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends one datagram. Best effort: success means the OS accepted it.
    async fn send_to(&self, bytes: &[u8], addr: SocketAddr) -> Result<(), TransportError>;

    /// Sends one datagram to the broadcast address on the plugs' port.
    async fn broadcast(&self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Waits up to `timeout` for the next datagram from anyone.
    ///
    /// Returns [`TransportError::ReceiveTimeout`] if nothing arrives.  The
    /// bytes are returned unvalidated.
    async fn receive(&self, timeout: Duration) -> Result<(Vec<u8>, SocketAddr), TransportError>;

    /// Drops every datagram already queued on the socket without waiting.
    /// Returns how many were dropped.
    fn discard_pending(&self) -> Result<usize, TransportError>;

    /// The UDP port plugs listen on.
    fn device_port(&self) -> u16;
}

/// Socket settings for [`UdpTransport::open`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Local interface to bind.  `0.0.0.0` binds all interfaces.
    pub bind_address: Ipv4Addr,
    /// Local port; `0` picks an ephemeral port.
    pub local_port: u16,
    /// Port the plugs listen on.
    pub device_port: u16,
    /// Destination of [`Transport::broadcast`].
    pub broadcast_address: Ipv4Addr,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bind_address: Ipv4Addr::UNSPECIFIED,
            local_port: 0,
            device_port: DEFAULT_PORT,
            broadcast_address: Ipv4Addr::BROADCAST,
        }
    }
}

/// [`Transport`] over a real, broadcast-enabled UDP socket.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    config: TransportConfig,
}

impl UdpTransport {
    /// Binds the socket described by `config` and enables broadcast.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Bind`] if the address is unavailable and
    /// [`TransportError::Io`] if broadcast cannot be enabled.
    pub async fn open(config: TransportConfig) -> Result<Self, TransportError> {
        let addr = SocketAddr::V4(SocketAddrV4::new(config.bind_address, config.local_port));
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| TransportError::Bind { addr, source })?;
        socket.set_broadcast(true)?;

        info!("UDP transport bound on {}", socket.local_addr()?);
        Ok(Self { socket, config })
    }

    /// The address the socket is actually bound to.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Io`] if the OS cannot report it.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.socket.local_addr()?)
    }

    fn broadcast_target(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(
            self.config.broadcast_address,
            self.config.device_port,
        ))
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send_to(&self, bytes: &[u8], addr: SocketAddr) -> Result<(), TransportError> {
        self.socket.send_to(bytes, addr).await?;
        debug!("sent {} bytes to {addr}", bytes.len());
        Ok(())
    }

    async fn broadcast(&self, bytes: &[u8]) -> Result<(), TransportError> {
        self.send_to(bytes, self.broadcast_target()).await
    }

    async fn receive(&self, timeout: Duration) -> Result<(Vec<u8>, SocketAddr), TransportError> {
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];
        match tokio::time::timeout(timeout, self.socket.recv_from(&mut buf)).await {
            Ok(Ok((len, source))) => {
                buf.truncate(len);
                debug!("received {len} bytes from {source}");
                Ok((buf, source))
            }
            Ok(Err(e)) => Err(TransportError::Io(e)),
            Err(_) => Err(TransportError::ReceiveTimeout(timeout)),
        }
    }

    fn discard_pending(&self) -> Result<usize, TransportError> {
        let mut buf = [0u8; RECV_BUFFER_SIZE];
        let mut discarded = 0;
        loop {
            match self.socket.try_recv_from(&mut buf) {
                Ok((len, source)) => {
                    debug!("discarding stale {len}-byte datagram from {source}");
                    discarded += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(discarded),
                Err(e) => return Err(TransportError::Io(e)),
            }
        }
    }

    fn device_port(&self) -> u16 {
        self.config.device_port
    }
}

/// A shared transport, so a caller can keep a handle while a service owns it.
#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send_to(&self, bytes: &[u8], addr: SocketAddr) -> Result<(), TransportError> {
        (**self).send_to(bytes, addr).await
    }

    async fn broadcast(&self, bytes: &[u8]) -> Result<(), TransportError> {
        (**self).broadcast(bytes).await
    }

    async fn receive(&self, timeout: Duration) -> Result<(Vec<u8>, SocketAddr), TransportError> {
        (**self).receive(timeout).await
    }

    fn discard_pending(&self) -> Result<usize, TransportError> {
        (**self).discard_pending()
    }

    fn device_port(&self) -> u16 {
        (**self).device_port()
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        match self.socket.local_addr() {
            Ok(addr) => debug!("closing UDP transport on {addr}"),
            Err(_) => debug!("closing UDP transport"),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback_config() -> TransportConfig {
        TransportConfig {
            bind_address: Ipv4Addr::LOCALHOST,
            ..TransportConfig::default()
        }
    }

    #[test]
    fn test_transport_config_default_targets_protocol_port() {
        // Arrange / Act
        let cfg = TransportConfig::default();

        // Assert
        assert_eq!(cfg.device_port, 10000);
        assert_eq!(cfg.local_port, 0);
        assert_eq!(cfg.broadcast_address, Ipv4Addr::BROADCAST);
    }

    #[test]
    fn test_is_timeout_only_for_receive_timeout() {
        assert!(TransportError::ReceiveTimeout(Duration::from_millis(1)).is_timeout());
        let io = TransportError::Io(io::Error::new(io::ErrorKind::Other, "boom"));
        assert!(!io.is_timeout());
    }

    #[tokio::test]
    async fn test_open_binds_ephemeral_port() {
        // Arrange / Act
        let transport = UdpTransport::open(loopback_config()).await.expect("bind");

        // Assert
        let addr = transport.local_addr().unwrap();
        assert_ne!(addr.port(), 0, "OS must assign a port");
    }

    #[tokio::test]
    async fn test_open_fails_when_port_in_use() {
        // Arrange: hold a port with a plain socket
        let holder = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = holder.local_addr().unwrap().port();
        let cfg = TransportConfig {
            local_port: port,
            ..loopback_config()
        };

        // Act
        let result = UdpTransport::open(cfg).await;

        // Assert
        assert!(matches!(result, Err(TransportError::Bind { .. })));
    }

    #[tokio::test]
    async fn test_send_and_receive_over_loopback() {
        // Arrange
        let a = UdpTransport::open(loopback_config()).await.unwrap();
        let b = UdpTransport::open(loopback_config()).await.unwrap();
        let b_addr = b.local_addr().unwrap();

        // Act
        a.send_to(b"hdqa", b_addr).await.unwrap();
        let (bytes, source) = b.receive(Duration::from_secs(2)).await.unwrap();

        // Assert
        assert_eq!(bytes, b"hdqa");
        assert_eq!(source, a.local_addr().unwrap());
    }

    #[tokio::test]
    async fn test_broadcast_goes_to_configured_address_and_port() {
        // Arrange: point the "broadcast" at a loopback listener
        let listener = UdpTransport::open(loopback_config()).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let sender = UdpTransport::open(TransportConfig {
            device_port: port,
            broadcast_address: Ipv4Addr::LOCALHOST,
            ..loopback_config()
        })
        .await
        .unwrap();

        // Act
        sender.broadcast(&[0x68, 0x64, 0x00, 0x06, 0x71, 0x61]).await.unwrap();
        let (bytes, _) = listener.receive(Duration::from_secs(2)).await.unwrap();

        // Assert
        assert_eq!(bytes.len(), 6);
    }

    #[tokio::test]
    async fn test_receive_times_out_on_silent_socket() {
        // Arrange
        let transport = UdpTransport::open(loopback_config()).await.unwrap();

        // Act
        let result = transport.receive(Duration::from_millis(50)).await;

        // Assert
        assert!(matches!(result, Err(TransportError::ReceiveTimeout(_))));
    }

    #[tokio::test]
    async fn test_discard_pending_drops_queued_datagrams() {
        // Arrange: two datagrams wait on b's socket
        let a = UdpTransport::open(loopback_config()).await.unwrap();
        let b = UdpTransport::open(loopback_config()).await.unwrap();
        let b_addr = b.local_addr().unwrap();
        a.send_to(b"stale-1", b_addr).await.unwrap();
        a.send_to(b"stale-2", b_addr).await.unwrap();
        b.socket.readable().await.unwrap();

        // Act
        let discarded = b.discard_pending().unwrap();

        // Assert
        assert_eq!(discarded, 2);
        let result = b.receive(Duration::from_millis(50)).await;
        assert!(matches!(result, Err(TransportError::ReceiveTimeout(_))));
    }

    #[tokio::test]
    async fn test_discard_pending_on_idle_socket_is_zero() {
        let transport = UdpTransport::open(loopback_config()).await.unwrap();

        assert_eq!(transport.discard_pending().unwrap(), 0);
    }
}

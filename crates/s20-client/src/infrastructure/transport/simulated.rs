//! In-memory [`Transport`] populated with simulated plugs.
//!
//! The real plugs need a LAN, a powered device, and a broadcast-capable
//! interface.  `SimulatedNetwork` replaces all of that with a queue: every
//! datagram the client sends is recorded, handed to the addressed plugs, and
//! their replies are pushed onto an inbox that [`Transport::receive`] drains.
//!
//! When the inbox is empty, `receive` sleeps for the full timeout on the tokio
//! clock and then reports [`TransportError::ReceiveTimeout`].  Run tests with
//! `#[tokio::test(start_paused = true)]` so those sleeps complete instantly.
//!
//! # Usage in tests
//!
//! ```ignore
//! let id: HardwareId = "ac:cf:23:00:00:01".parse().unwrap();
//! let network = SimulatedNetwork::new()
//!     .with_plug(SimulatedPlug::new(Ipv4Addr::new(192, 168, 1, 40), id).with_state(false));
//!
//! controller.turn_on(&network, &device).await.unwrap();
//!
//! assert_eq!(network.plug_state(id), Some(true));
//! ```

use std::collections::VecDeque;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use s20_core::protocol::messages::{
    AnnounceMessage, ControlMessage, SubscribeAckMessage, DEFAULT_PORT,
};
use s20_core::{decode_message, encode_message, HardwareId, S20Message};
use tracing::debug;

use super::{Transport, TransportError};

/// Address the simulated client appears to send from.
const CLIENT_ADDR: SocketAddr =
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 2), 49152));

/// One simulated plug and its firmware-side state.
#[derive(Debug, Clone)]
pub struct SimulatedPlug {
    address: Ipv4Addr,
    hardware_id: HardwareId,
    device_type: [u8; 6],
    on: bool,
    subscribed: bool,
    silent: bool,
    drop_replies: usize,
    announcements: usize,
}

impl SimulatedPlug {
    /// An S20 socket at `address`, switched off, answering everything.
    pub fn new(address: Ipv4Addr, hardware_id: HardwareId) -> Self {
        Self {
            address,
            hardware_id,
            device_type: *b"SOC002",
            on: false,
            subscribed: false,
            silent: false,
            drop_replies: 0,
            announcements: 1,
        }
    }

    pub fn with_state(mut self, on: bool) -> Self {
        self.on = on;
        self
    }

    /// The plug never replies to anything.
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// Loses the next `count` replies the plug would send.
    pub fn dropping_replies(mut self, count: usize) -> Self {
        self.drop_replies = count;
        self
    }

    /// Answers each discovery probe `count` times.
    pub fn announcing(mut self, count: usize) -> Self {
        self.announcements = count;
        self
    }

    pub fn with_device_type(mut self, code: [u8; 6]) -> Self {
        self.device_type = code;
        self
    }

    fn source(&self, port: u16) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.address, port))
    }

    /// Firmware behaviour: returns the replies to one inbound message.
    fn handle(&mut self, msg: &S20Message) -> Vec<S20Message> {
        if self.silent {
            return Vec::new();
        }
        let replies = match msg {
            S20Message::DiscoverProbe => {
                let announce = S20Message::DiscoverAnnounce(AnnounceMessage {
                    status: 0,
                    hardware_id: self.hardware_id,
                    device_type: self.device_type,
                    clock: 0,
                    on: self.on,
                });
                vec![announce; self.announcements]
            }
            S20Message::SubscribeRequest(req) if req.hardware_id == self.hardware_id => {
                self.subscribed = true;
                vec![S20Message::SubscribeAck(SubscribeAckMessage {
                    hardware_id: self.hardware_id,
                    on: self.on,
                })]
            }
            S20Message::ControlRequest(req) if req.hardware_id == self.hardware_id => {
                if !self.subscribed {
                    debug!("plug {} ignores control without subscription", self.hardware_id);
                    return Vec::new();
                }
                self.on = req.on;
                vec![S20Message::ControlAck(ControlMessage {
                    hardware_id: self.hardware_id,
                    on: self.on,
                })]
            }
            _ => Vec::new(),
        };

        replies
            .into_iter()
            .filter(|_| {
                if self.drop_replies > 0 {
                    self.drop_replies -= 1;
                    false
                } else {
                    true
                }
            })
            .collect()
    }
}

/// One datagram the client sent through the simulated network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentFrame {
    /// `None` for a broadcast.
    pub destination: Option<SocketAddr>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Default)]
struct NetworkState {
    plugs: Vec<SimulatedPlug>,
    inbox: VecDeque<(Vec<u8>, SocketAddr)>,
    /// Datagrams released into the inbox by the client's next send.
    after_send: Vec<(Vec<u8>, SocketAddr)>,
    sent: Vec<SentFrame>,
}

/// In-memory network of [`SimulatedPlug`]s implementing [`Transport`].
///
/// State lives behind a `std::sync::Mutex` that is never held across an
/// `.await`.
#[derive(Debug)]
pub struct SimulatedNetwork {
    state: Mutex<NetworkState>,
    device_port: u16,
    echo_broadcasts: bool,
}

impl Default for SimulatedNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedNetwork {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(NetworkState::default()),
            device_port: DEFAULT_PORT,
            echo_broadcasts: false,
        }
    }

    pub fn with_plug(self, plug: SimulatedPlug) -> Self {
        self.add_plug(plug);
        self
    }

    /// Delivers the client's own broadcasts back to it, as a real broadcast
    /// socket does.
    pub fn with_broadcast_echo(mut self) -> Self {
        self.echo_broadcasts = true;
        self
    }

    pub fn add_plug(&self, plug: SimulatedPlug) {
        self.state.lock().unwrap().plugs.push(plug);
    }

    /// Queues an arbitrary datagram for the client, e.g. noise from another
    /// host.
    pub fn inject(&self, bytes: Vec<u8>, source: SocketAddr) {
        self.state.lock().unwrap().inbox.push_back((bytes, source));
    }

    /// Queues a datagram that arrives right after the client's next send,
    /// ahead of any plug reply to it.
    pub fn inject_after_send(&self, bytes: Vec<u8>, source: SocketAddr) {
        self.state.lock().unwrap().after_send.push((bytes, source));
    }

    /// Number of datagrams waiting to be received.
    pub fn pending(&self) -> usize {
        self.state.lock().unwrap().inbox.len()
    }

    /// Every frame the client sent, in order.
    pub fn sent_frames(&self) -> Vec<SentFrame> {
        self.state.lock().unwrap().sent.clone()
    }

    /// Every frame the client sent that decodes as a message, in order.
    pub fn sent_messages(&self) -> Vec<S20Message> {
        self.state
            .lock()
            .unwrap()
            .sent
            .iter()
            .filter_map(|frame| decode_message(&frame.bytes).ok())
            .collect()
    }

    pub fn clear_sent(&self) {
        self.state.lock().unwrap().sent.clear();
    }

    /// Current relay state of the plug with `hardware_id`.
    pub fn plug_state(&self, hardware_id: HardwareId) -> Option<bool> {
        self.update_plug(hardware_id, |plug| plug.on)
    }

    /// Flips the relay from the device side (the physical button).
    pub fn set_plug_state(&self, hardware_id: HardwareId, on: bool) {
        self.update_plug(hardware_id, |plug| plug.on = on);
    }

    pub fn set_silent(&self, hardware_id: HardwareId, silent: bool) {
        self.update_plug(hardware_id, |plug| plug.silent = silent);
    }

    /// Makes every plug forget its subscriber, as the firmware does after a
    /// while.
    pub fn expire_subscriptions(&self) {
        for plug in self.state.lock().unwrap().plugs.iter_mut() {
            plug.subscribed = false;
        }
    }

    fn update_plug<R>(
        &self,
        hardware_id: HardwareId,
        f: impl FnOnce(&mut SimulatedPlug) -> R,
    ) -> Option<R> {
        let mut state = self.state.lock().unwrap();
        state
            .plugs
            .iter_mut()
            .find(|plug| plug.hardware_id == hardware_id)
            .map(f)
    }

    fn deliver(&self, bytes: &[u8], destination: Option<SocketAddr>) {
        let mut state = self.state.lock().unwrap();
        state.sent.push(SentFrame {
            destination,
            bytes: bytes.to_vec(),
        });

        if destination.is_none() && self.echo_broadcasts {
            state.inbox.push_back((bytes.to_vec(), CLIENT_ADDR));
        }
        let released: Vec<_> = state.after_send.drain(..).collect();
        state.inbox.extend(released);

        let msg = match decode_message(bytes) {
            Ok(msg) => msg,
            Err(e) => {
                debug!("simulated plugs ignore undecodable frame: {e}");
                return;
            }
        };

        let port = self.device_port;
        let NetworkState { plugs, inbox, .. } = &mut *state;
        for plug in plugs.iter_mut() {
            let addressed = match destination {
                None => true,
                Some(addr) => addr == plug.source(port),
            };
            if !addressed {
                continue;
            }
            for reply in plug.handle(&msg) {
                match encode_message(&reply) {
                    Ok(frame) => inbox.push_back((frame, plug.source(port))),
                    Err(e) => debug!("simulated plug failed to encode reply: {e}"),
                }
            }
        }
    }
}

#[async_trait]
impl Transport for SimulatedNetwork {
    async fn send_to(&self, bytes: &[u8], addr: SocketAddr) -> Result<(), TransportError> {
        self.deliver(bytes, Some(addr));
        Ok(())
    }

    async fn broadcast(&self, bytes: &[u8]) -> Result<(), TransportError> {
        self.deliver(bytes, None);
        Ok(())
    }

    async fn receive(&self, timeout: Duration) -> Result<(Vec<u8>, SocketAddr), TransportError> {
        let next = self.state.lock().unwrap().inbox.pop_front();
        match next {
            Some(datagram) => Ok(datagram),
            None => {
                tokio::time::sleep(timeout).await;
                Err(TransportError::ReceiveTimeout(timeout))
            }
        }
    }

    fn discard_pending(&self) -> Result<usize, TransportError> {
        let mut state = self.state.lock().unwrap();
        let discarded = state.inbox.len();
        state.inbox.clear();
        Ok(discarded)
    }

    fn device_port(&self) -> u16 {
        self.device_port
    }
}

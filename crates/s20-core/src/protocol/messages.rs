//! All Orvibo S20 protocol message types and wire constants.
//!
//! Every frame starts with the same 6-byte header:
//!
//! ```text
//! [magic:2 = 0x68 0x64][frame_len:2][command:2][payload:N]
//! ```
//!
//! `frame_len` counts the whole frame, header included.  The same command
//! code is used by a request and its reply ("qa" for discovery, "cl" for
//! subscription), so the payload length tells the two apart.

use crate::domain::device::HardwareId;

// ── Protocol constants ────────────────────────────────────────────────────────

/// Magic prefix carried by every frame ("hd").
pub const MAGIC: [u8; 2] = [0x68, 0x64];

/// Size of the common frame header in bytes.
pub const HEADER_SIZE: usize = 6;

/// Largest frame the 16-bit length field can describe.
pub const MAX_FRAME_SIZE: usize = u16::MAX as usize;

/// Largest payload that still fits in [`MAX_FRAME_SIZE`].
pub const MAX_PAYLOAD_SIZE: usize = MAX_FRAME_SIZE - HEADER_SIZE;

/// UDP port the plugs listen on.
pub const DEFAULT_PORT: u16 = 10000;

/// Filler byte used between hardware id fields.
pub const PADDING_BYTE: u8 = 0x20;

/// Six padding bytes, as they appear after every hardware id field.
pub const PADDING: [u8; 6] = [PADDING_BYTE; 6];

/// State byte meaning "relay closed / on".
pub const STATE_ON: u8 = 0x01;

/// State byte meaning "relay open / off".
pub const STATE_OFF: u8 = 0x00;

/// Payload sizes of each message layout.
pub mod payload_len {
    pub const DISCOVER_PROBE: usize = 0;
    pub const DISCOVER_ANNOUNCE: usize = 36;
    pub const SUBSCRIBE_REQUEST: usize = 24;
    pub const SUBSCRIBE_ACK: usize = 18;
    pub const CONTROL: usize = 17;
}

// ── Command codes ─────────────────────────────────────────────────────────────

/// Command codes defined by the S20 firmware.
///
/// The codes are two ASCII characters read as a big-endian `u16`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Command {
    /// "qa": discovery probe and announcement.
    Discover = 0x7161,
    /// "cl": subscribe request and acknowledgment.
    Subscribe = 0x636c,
    /// "dc": power state change request.
    Control = 0x6463,
    /// "sf": power state change acknowledgment.
    StateChanged = 0x7366,
}

impl TryFrom<u16> for Command {
    type Error = ();

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0x7161 => Ok(Command::Discover),
            0x636c => Ok(Command::Subscribe),
            0x6463 => Ok(Command::Control),
            0x7366 => Ok(Command::StateChanged),
            _ => Err(()),
        }
    }
}

// ── Message payload structs ───────────────────────────────────────────────────

/// A plug's reply to a discovery probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnounceMessage {
    /// Leading status byte; `0x00` on every firmware seen so far.
    pub status: u8,
    pub hardware_id: HardwareId,
    /// Six ASCII characters, e.g. `SOC002` for the S20 socket.
    pub device_type: [u8; 6],
    /// The plug's internal clock (seconds since 1900, little-endian on the wire).
    pub clock: u32,
    /// Power state at the time of the announcement.
    pub on: bool,
}

/// Subscribe (and query) request sent to a single plug.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscribeRequestMessage {
    pub hardware_id: HardwareId,
}

/// A plug's acknowledgment of a subscription, carrying its power state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscribeAckMessage {
    pub hardware_id: HardwareId,
    pub on: bool,
}

/// Power state change request, or the plug's acknowledgment of one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlMessage {
    pub hardware_id: HardwareId,
    pub on: bool,
}

// ── Top-level message enum ────────────────────────────────────────────────────

/// One decoded S20 protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum S20Message {
    DiscoverProbe,
    DiscoverAnnounce(AnnounceMessage),
    SubscribeRequest(SubscribeRequestMessage),
    SubscribeAck(SubscribeAckMessage),
    ControlRequest(ControlMessage),
    ControlAck(ControlMessage),
}

impl S20Message {
    /// Returns the command code this message is framed with.
    pub fn command(&self) -> Command {
        match self {
            S20Message::DiscoverProbe | S20Message::DiscoverAnnounce(_) => Command::Discover,
            S20Message::SubscribeRequest(_) | S20Message::SubscribeAck(_) => Command::Subscribe,
            S20Message::ControlRequest(_) => Command::Control,
            S20Message::ControlAck(_) => Command::StateChanged,
        }
    }

    /// Short name used in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            S20Message::DiscoverProbe => "discover-probe",
            S20Message::DiscoverAnnounce(_) => "discover-announce",
            S20Message::SubscribeRequest(_) => "subscribe-request",
            S20Message::SubscribeAck(_) => "subscribe-ack",
            S20Message::ControlRequest(_) => "control-request",
            S20Message::ControlAck(_) => "control-ack",
        }
    }

    /// Hardware id carried by the message, if any.
    pub fn hardware_id(&self) -> Option<HardwareId> {
        match self {
            S20Message::DiscoverProbe => None,
            S20Message::DiscoverAnnounce(m) => Some(m.hardware_id),
            S20Message::SubscribeRequest(m) => Some(m.hardware_id),
            S20Message::SubscribeAck(m) => Some(m.hardware_id),
            S20Message::ControlRequest(m) | S20Message::ControlAck(m) => Some(m.hardware_id),
        }
    }
}

/// Converts a power state into its wire byte.
pub fn state_byte(on: bool) -> u8 {
    if on {
        STATE_ON
    } else {
        STATE_OFF
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_codes_are_ascii_pairs() {
        assert_eq!((Command::Discover as u16).to_be_bytes(), *b"qa");
        assert_eq!((Command::Subscribe as u16).to_be_bytes(), *b"cl");
        assert_eq!((Command::Control as u16).to_be_bytes(), *b"dc");
        assert_eq!((Command::StateChanged as u16).to_be_bytes(), *b"sf");
    }

    #[test]
    fn test_command_try_from_round_trips_known_codes() {
        for cmd in [
            Command::Discover,
            Command::Subscribe,
            Command::Control,
            Command::StateChanged,
        ] {
            assert_eq!(Command::try_from(cmd as u16), Ok(cmd));
        }
    }

    #[test]
    fn test_command_try_from_rejects_unknown_code() {
        assert!(Command::try_from(0x7274).is_err()); // "rt", table read
    }

    #[test]
    fn test_query_and_subscribe_share_a_command() {
        let id = HardwareId::new([1, 2, 3, 4, 5, 6]);
        let req = S20Message::SubscribeRequest(SubscribeRequestMessage { hardware_id: id });
        let ack = S20Message::SubscribeAck(SubscribeAckMessage { hardware_id: id, on: true });
        assert_eq!(req.command(), ack.command());
    }

    #[test]
    fn test_state_byte_maps_booleans() {
        assert_eq!(state_byte(true), STATE_ON);
        assert_eq!(state_byte(false), STATE_OFF);
    }

    #[test]
    fn test_max_payload_fits_length_field() {
        assert_eq!(MAX_PAYLOAD_SIZE + HEADER_SIZE, u16::MAX as usize);
    }
}

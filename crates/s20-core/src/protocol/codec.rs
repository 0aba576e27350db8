//! Binary codec for encoding and decoding S20 protocol frames.
//!
//! Wire format:
//! ```text
//! [magic:2][frame_len:2][command:2][payload:N]
//! ```
//! Header size: 6 bytes. `frame_len` covers the whole frame. All multi-byte
//! integers are big-endian except the announcement clock, which the firmware
//! writes little-endian.
//!
//! Two layers are exposed:
//!
//! - [`encode_frame`] / [`decode_frame`] work on a raw `(command, payload)`
//!   pair and only enforce the framing rules.
//! - [`encode_message`] / [`decode_message`] map frames to typed
//!   [`S20Message`]s.

use crate::domain::device::{HardwareId, HARDWARE_ID_LEN};
use crate::protocol::messages::{
    payload_len, state_byte, AnnounceMessage, Command, ControlMessage, S20Message,
    SubscribeAckMessage, SubscribeRequestMessage, HEADER_SIZE, MAGIC, MAX_PAYLOAD_SIZE,
    PADDING, STATE_OFF,
};
use thiserror::Error;

/// Errors that can occur during frame encoding or decoding.
///
/// Every variant describes a malformed packet: the bytes fail structural
/// validation and must not be interpreted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The byte slice is shorter than the fixed header.
    #[error("frame too short: need at least {needed} bytes, got {available}")]
    TooShort { needed: usize, available: usize },

    /// The first two bytes are not the protocol magic.
    #[error("bad magic prefix: {0:02X?}")]
    BadMagic([u8; 2]),

    /// The length field disagrees with the datagram size.
    #[error("frame length mismatch: header says {declared}, frame is {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    /// The payload cannot be described by the 16-bit length field.
    #[error("payload of {len} bytes exceeds maximum of {max}")]
    PayloadTooLarge { len: usize, max: usize },

    /// The command code is not one this client understands.
    #[error("unknown command: 0x{0:04X}")]
    UnknownCommand(u16),

    /// The payload does not match any layout for its command.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

// ── Frame layer ───────────────────────────────────────────────────────────────

/// Builds a complete frame around `payload`.
///
/// # Errors
///
/// Returns [`ProtocolError::PayloadTooLarge`] if the frame would not fit the
/// 16-bit length field.
///
/// # Examples
///
/// ```rust
/// use s20_core::protocol::{decode_frame, encode_frame};
///
/// let frame = encode_frame(0x7161, &[]).unwrap();
/// assert_eq!(frame, [0x68, 0x64, 0x00, 0x06, 0x71, 0x61]);
/// assert_eq!(decode_frame(&frame).unwrap(), (0x7161, &[][..]));
/// ```
pub fn encode_frame(command: u16, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::PayloadTooLarge {
            len: payload.len(),
            max: MAX_PAYLOAD_SIZE,
        });
    }
    let frame_len = (HEADER_SIZE + payload.len()) as u16;

    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&MAGIC);
    buf.extend_from_slice(&frame_len.to_be_bytes());
    buf.extend_from_slice(&command.to_be_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Splits a datagram into its command code and payload.
///
/// The datagram must be exactly one frame: trailing or missing bytes are a
/// [`ProtocolError::LengthMismatch`].
///
/// # Errors
///
/// Returns [`ProtocolError`] if the bytes are malformed.
pub fn decode_frame(bytes: &[u8]) -> Result<(u16, &[u8]), ProtocolError> {
    if bytes.len() < HEADER_SIZE {
        return Err(ProtocolError::TooShort {
            needed: HEADER_SIZE,
            available: bytes.len(),
        });
    }

    let magic = [bytes[0], bytes[1]];
    if magic != MAGIC {
        return Err(ProtocolError::BadMagic(magic));
    }

    let declared = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;
    if declared != bytes.len() {
        return Err(ProtocolError::LengthMismatch {
            declared,
            actual: bytes.len(),
        });
    }

    let command = u16::from_be_bytes([bytes[4], bytes[5]]);
    Ok((command, &bytes[HEADER_SIZE..]))
}

// ── Message layer ─────────────────────────────────────────────────────────────

/// Encodes a typed [`S20Message`] into a complete frame.
///
/// # Errors
///
/// Returns [`ProtocolError`] if framing fails (cannot happen for the fixed
/// layouts defined here, but the frame layer is fallible).
pub fn encode_message(msg: &S20Message) -> Result<Vec<u8>, ProtocolError> {
    let mut payload = Vec::new();
    match msg {
        S20Message::DiscoverProbe => {}
        S20Message::DiscoverAnnounce(m) => encode_announce(&mut payload, m),
        S20Message::SubscribeRequest(m) => encode_subscribe_request(&mut payload, m),
        S20Message::SubscribeAck(m) => encode_subscribe_ack(&mut payload, m),
        S20Message::ControlRequest(m) | S20Message::ControlAck(m) => {
            encode_control(&mut payload, m)
        }
    }
    encode_frame(msg.command() as u16, &payload)
}

/// Decodes one datagram into a typed [`S20Message`].
///
/// # Errors
///
/// Returns [`ProtocolError`] if the framing is invalid, the command is
/// unknown, or the payload fits none of the command's layouts.
///
/// # Examples
///
/// ```rust
/// use s20_core::protocol::{decode_message, encode_message, S20Message};
///
/// let bytes = encode_message(&S20Message::DiscoverProbe).unwrap();
/// assert_eq!(decode_message(&bytes).unwrap(), S20Message::DiscoverProbe);
/// ```
pub fn decode_message(bytes: &[u8]) -> Result<S20Message, ProtocolError> {
    let (code, payload) = decode_frame(bytes)?;
    let command = Command::try_from(code).map_err(|_| ProtocolError::UnknownCommand(code))?;

    match (command, payload.len()) {
        (Command::Discover, payload_len::DISCOVER_PROBE) => Ok(S20Message::DiscoverProbe),
        (Command::Discover, payload_len::DISCOVER_ANNOUNCE) => {
            Ok(S20Message::DiscoverAnnounce(decode_announce(payload)?))
        }
        (Command::Subscribe, payload_len::SUBSCRIBE_REQUEST) => Ok(S20Message::SubscribeRequest(
            SubscribeRequestMessage {
                hardware_id: read_hardware_id(payload, 0)?,
            },
        )),
        (Command::Subscribe, payload_len::SUBSCRIBE_ACK) => {
            Ok(S20Message::SubscribeAck(SubscribeAckMessage {
                hardware_id: read_hardware_id(payload, 0)?,
                on: payload[payload_len::SUBSCRIBE_ACK - 1] != STATE_OFF,
            }))
        }
        (Command::Control, payload_len::CONTROL) => {
            Ok(S20Message::ControlRequest(decode_control(payload)?))
        }
        (Command::StateChanged, payload_len::CONTROL) => {
            Ok(S20Message::ControlAck(decode_control(payload)?))
        }
        (command, len) => Err(ProtocolError::MalformedPayload(format!(
            "{command:?}: no layout with {len} payload bytes"
        ))),
    }
}

// ── Per-message helpers ───────────────────────────────────────────────────────

fn encode_announce(buf: &mut Vec<u8>, m: &AnnounceMessage) {
    buf.push(m.status);
    buf.extend_from_slice(m.hardware_id.as_bytes());
    buf.extend_from_slice(&PADDING);
    buf.extend_from_slice(m.hardware_id.reversed().as_bytes());
    buf.extend_from_slice(&PADDING);
    buf.extend_from_slice(&m.device_type);
    buf.extend_from_slice(&m.clock.to_le_bytes());
    buf.push(state_byte(m.on));
}

fn encode_subscribe_request(buf: &mut Vec<u8>, m: &SubscribeRequestMessage) {
    // The firmware expects the id twice: natural order, then reversed.
    buf.extend_from_slice(m.hardware_id.as_bytes());
    buf.extend_from_slice(&PADDING);
    buf.extend_from_slice(m.hardware_id.reversed().as_bytes());
    buf.extend_from_slice(&PADDING);
}

fn encode_subscribe_ack(buf: &mut Vec<u8>, m: &SubscribeAckMessage) {
    buf.extend_from_slice(m.hardware_id.as_bytes());
    buf.extend_from_slice(&PADDING);
    buf.extend_from_slice(&[0u8; 5]);
    buf.push(state_byte(m.on));
}

fn encode_control(buf: &mut Vec<u8>, m: &ControlMessage) {
    buf.extend_from_slice(m.hardware_id.as_bytes());
    buf.extend_from_slice(&PADDING);
    buf.extend_from_slice(&[0u8; 4]);
    buf.push(state_byte(m.on));
}

fn decode_announce(p: &[u8]) -> Result<AnnounceMessage, ProtocolError> {
    // 1 (status) + 6 (id) + 6 (pad) + 6 (rev id) + 6 (pad) + 6 (type) + 4 (clock) + 1 (state)
    require_len(p, payload_len::DISCOVER_ANNOUNCE, "DiscoverAnnounce")?;
    let hardware_id = read_hardware_id(p, 1)?;
    let mut device_type = [0u8; 6];
    device_type.copy_from_slice(&p[25..31]);
    let clock = u32::from_le_bytes([p[31], p[32], p[33], p[34]]);
    Ok(AnnounceMessage {
        status: p[0],
        hardware_id,
        device_type,
        clock,
        on: p[35] != STATE_OFF,
    })
}

fn decode_control(p: &[u8]) -> Result<ControlMessage, ProtocolError> {
    require_len(p, payload_len::CONTROL, "Control")?;
    Ok(ControlMessage {
        hardware_id: read_hardware_id(p, 0)?,
        on: p[payload_len::CONTROL - 1] != STATE_OFF,
    })
}

// ── Utility helpers ───────────────────────────────────────────────────────────

fn require_len(buf: &[u8], needed: usize, context: &str) -> Result<(), ProtocolError> {
    if buf.len() < needed {
        Err(ProtocolError::MalformedPayload(format!(
            "{context}: need {needed} bytes, got {}",
            buf.len()
        )))
    } else {
        Ok(())
    }
}

fn read_hardware_id(buf: &[u8], offset: usize) -> Result<HardwareId, ProtocolError> {
    let bytes = buf
        .get(offset..offset + HARDWARE_ID_LEN)
        .ok_or_else(|| {
            ProtocolError::MalformedPayload(format!(
                "need {HARDWARE_ID_LEN} bytes for hardware id at offset {offset}"
            ))
        })?;
    let mut id = [0u8; HARDWARE_ID_LEN];
    id.copy_from_slice(bytes);
    Ok(HardwareId::new(id))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

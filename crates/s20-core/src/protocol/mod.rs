//! Protocol module containing message types and the binary codec.

pub mod codec;
pub mod messages;

pub use codec::{decode_frame, decode_message, encode_frame, encode_message, ProtocolError};
pub use messages::*;

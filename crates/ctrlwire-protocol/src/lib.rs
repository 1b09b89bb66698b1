//! Wire protocol for ctrlwire.
//!
//! This crate defines the bytes a client and a device exchange:
//!
//! - **Frames** ([`Frame`], [`encode_request`], [`decode_frame`]) — the
//!   fixed header plus payload that travels in every socket message.
//! - **Values** ([`ValueKind`], [`Value`], [`BinaryReader`],
//!   [`encode_value`]) — how typed property values are laid out inside a
//!   payload.
//! - **Errors** ([`ProtocolError`]) — what can go wrong while encoding or
//!   decoding.
//!
//! Nothing here holds state or touches a socket. The connection engine
//! builds on these functions; the property layer uses the value codec to
//! build write payloads and to decode notifications.

mod error;
mod frame;
mod value;

pub use error::ProtocolError;
pub use frame::{
    Frame, GET_CONFIG, HEADER_LEN, MAX_PAYLOAD_LEN, RESPONSE_BINARY, RESPONSE_STRING,
    RESTART, SUCCESS_TOKEN, decode_frame, encode_request,
};
pub use value::{
    BinaryReader, Value, ValueKind, encode_fixed_string, encode_value, truncate_utf8,
};

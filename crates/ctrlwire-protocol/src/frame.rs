//! The binary frame: the single wire unit in both directions.
//!
//! ```text
//! | signature (2B) | request id (u16 LE) | type (u8) | length (u16 LE) | payload |
//! ```
//!
//! A request id of `0` marks an unsolicited notification pushed by the
//! device; its `type` is the wire command of the property that changed.
//! Replies to requests carry the request's id and one of the system
//! response types below.

use crate::{BinaryReader, ProtocolError};

/// Size of the fixed header in bytes (2 + 2 + 1 + 2).
pub const HEADER_LEN: usize = 7;

/// Largest payload a request may carry.
///
/// The length field is 16 bits wide, but devices only accept payloads up
/// to this cap.
pub const MAX_PAYLOAD_LEN: usize = 255;

/// Reply type: the payload is a UTF-8 status string.
pub const RESPONSE_STRING: u8 = 0xf0;

/// Reply type: the payload is an opaque binary result.
pub const RESPONSE_BINARY: u8 = 0xf1;

/// Request the device's full configuration block.
pub const GET_CONFIG: u8 = 0xfa;

/// Ask the device to restart.
pub const RESTART: u8 = 0xfb;

/// The status string a device sends for a successful command.
pub const SUCCESS_TOKEN: &str = "OK";

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub signature: [u8; 2],
    pub request_id: u16,
    pub frame_type: u8,
    /// The length field as sent. Decoding does not rely on it.
    pub declared_len: u16,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Returns `true` for device-initiated frames (request id `0`).
    pub fn is_notification(&self) -> bool {
        self.request_id == 0
    }

    /// A reader positioned at the start of the payload.
    pub fn reader(&self) -> BinaryReader<'_> {
        BinaryReader::new(&self.payload)
    }

    /// The payload as text, up to the first zero byte.
    pub fn parse_string(&self) -> String {
        let end = self
            .payload
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.payload.len());
        String::from_utf8_lossy(&self.payload[..end]).into_owned()
    }
}

/// Encodes a request frame.
///
/// With `payload == None` the length field is zero and no payload bytes
/// follow the header.
pub fn encode_request(
    signature: [u8; 2],
    request_id: u16,
    command: u8,
    payload: Option<&[u8]>,
) -> Result<Vec<u8>, ProtocolError> {
    let payload = payload.unwrap_or_default();
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::PayloadTooLarge {
            len: payload.len(),
            max: MAX_PAYLOAD_LEN,
        });
    }

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&signature);
    out.extend_from_slice(&request_id.to_le_bytes());
    out.push(command);
    // Fits: checked against MAX_PAYLOAD_LEN above.
    out.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Decodes a frame.
///
/// Every byte after the header is taken as payload, regardless of the
/// declared length.
pub fn decode_frame(bytes: &[u8]) -> Result<Frame, ProtocolError> {
    if bytes.len() < HEADER_LEN {
        return Err(ProtocolError::MalformedFrame { len: bytes.len() });
    }

    let mut reader = BinaryReader::new(bytes);
    let signature = [reader.read_u8()?, reader.read_u8()?];
    let request_id = reader.read_u16()?;
    let frame_type = reader.read_u8()?;
    let declared_len = reader.read_u16()?;

    Ok(Frame {
        signature,
        request_id,
        frame_type,
        declared_len,
        payload: bytes[HEADER_LEN..].to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIG: [u8; 2] = [0xba, 0xda];

    // =========================================================================
    // encode_request
    // =========================================================================

    #[test]
    fn test_encode_request_layout() {
        let bytes = encode_request(SIG, 0x0102, 0x03, Some(&[0x40, 0x1f])).unwrap();
        assert_eq!(bytes, [0xba, 0xda, 0x02, 0x01, 0x03, 0x02, 0x00, 0x40, 0x1f]);
    }

    #[test]
    fn test_encode_request_without_payload() {
        let bytes = encode_request(SIG, 1, GET_CONFIG, None).unwrap();
        assert_eq!(bytes, [0xba, 0xda, 0x01, 0x00, 0xfa, 0x00, 0x00]);
    }

    #[test]
    fn test_encode_request_payload_too_large() {
        let payload = vec![0u8; MAX_PAYLOAD_LEN + 1];
        let err = encode_request(SIG, 1, 0x10, Some(&payload)).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::PayloadTooLarge { len: 256, max: 255 }
        );
    }

    // =========================================================================
    // decode_frame
    // =========================================================================

    #[test]
    fn test_decode_round_trip_empty_and_full() {
        for len in [0usize, MAX_PAYLOAD_LEN] {
            let payload: Vec<u8> = (0..len).map(|i| i as u8).collect();
            let bytes = encode_request(SIG, 65534, 0x21, Some(&payload)).unwrap();
            let frame = decode_frame(&bytes).unwrap();
            assert_eq!(frame.signature, SIG);
            assert_eq!(frame.request_id, 65534);
            assert_eq!(frame.frame_type, 0x21);
            assert_eq!(usize::from(frame.declared_len), len);
            assert_eq!(frame.payload, payload);
        }
    }

    #[test]
    fn test_decode_short_buffer_is_malformed() {
        let err = decode_frame(&[0xba, 0xda, 0, 0, 0, 0]).unwrap_err();
        assert_eq!(err, ProtocolError::MalformedFrame { len: 6 });
    }

    #[test]
    fn test_decode_ignores_declared_length() {
        // Declares 1 byte, carries 3.
        let bytes = [0xba, 0xda, 0x05, 0x00, 0xf1, 0x01, 0x00, 0xaa, 0xbb, 0xcc];
        let frame = decode_frame(&bytes).unwrap();
        assert_eq!(frame.declared_len, 1);
        assert_eq!(frame.payload, [0xaa, 0xbb, 0xcc]);
    }

    #[test]
    fn test_notification_flag() {
        let bytes = [0xba, 0xda, 0x00, 0x00, 0x10, 0x01, 0x00, 0x01];
        assert!(decode_frame(&bytes).unwrap().is_notification());
    }

    #[test]
    fn test_parse_string_stops_at_nul() {
        let frame = Frame {
            signature: SIG,
            request_id: 3,
            frame_type: RESPONSE_STRING,
            declared_len: 4,
            payload: b"OK\0\0".to_vec(),
        };
        assert_eq!(frame.parse_string(), SUCCESS_TOKEN);
    }
}

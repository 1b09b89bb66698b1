//! Error types for the protocol layer.
//!
//! Everything in this crate is pure encoding and decoding, so every error
//! here is fatal to the one call that produced it and says nothing about
//! the health of the connection.

use crate::ValueKind;

/// Errors that can occur while encoding or decoding frames and values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// The request payload exceeds the protocol's per-frame cap.
    #[error("payload of {len} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { len: usize, max: usize },

    /// The buffer is shorter than the fixed frame header.
    #[error("malformed frame: {len} bytes is shorter than the header")]
    MalformedFrame { len: usize },

    /// A value kind name that is not in the kind table.
    #[error("unknown value kind `{0}`")]
    UnknownValueKind(String),

    /// A value whose variant does not fit the declared kind.
    #[error("value `{value}` does not fit kind {kind}")]
    ValueMismatch { kind: ValueKind, value: String },

    /// A read ran past the end of the buffer.
    #[error("truncated input: needed {needed} bytes, {remaining} left")]
    Truncated { needed: usize, remaining: usize },

    /// A string kind was used without the width it needs.
    #[error("kind {0} requires a maximum length")]
    MissingWidth(ValueKind),
}

//! Error types for the property layer.

use ctrlwire_protocol::ProtocolError;

/// Errors that can occur while loading a directory or walking a
/// configuration tree.
#[derive(Debug, thiserror::Error)]
pub enum PropsError {
    /// A dotted path with an empty segment.
    #[error("invalid property path `{0}`")]
    InvalidPath(String),

    /// A path walks through a scalar.
    #[error("`{0}` is a scalar, not an object or array")]
    NotAContainer(String),

    /// An array index beyond the end of the array.
    #[error("index {index} out of bounds at `{path}` (length {len})")]
    IndexOutOfBounds {
        path: String,
        index: usize,
        len: usize,
    },

    /// Two directory entries share a key.
    #[error("duplicate property key `{0}`")]
    DuplicateKey(String),

    /// No directory entry with this key.
    #[error("unknown property `{0}`")]
    UnknownProperty(String),

    /// The directory or layout file is not valid JSON for its schema.
    #[error("invalid directory: {0}")]
    Json(#[from] serde_json::Error),

    /// A value could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

//! Unified error type for the ctrlwire client.

use ctrlwire_engine::EngineError;
use ctrlwire_props::PropsError;
use ctrlwire_protocol::ProtocolError;
use ctrlwire_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each wrapper variant lets `?` convert
/// sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum CtrlwireError {
    /// A transport-level error (connect, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A value or frame could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A request failed or the engine is gone.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The property directory, a path or a layout is invalid.
    #[error(transparent)]
    Props(#[from] PropsError),

    /// The key is not in the property directory.
    #[error("unknown property `{0}`")]
    UnknownProperty(String),

    /// `set()` on an action property.
    #[error("`{0}` is an action, not a value property")]
    NotAValue(String),

    /// `trigger()` on a value property.
    #[error("`{0}` is a value property, not an action")]
    NotAnAction(String),

    /// A write or action for this property is still in flight.
    #[error("`{0}` is busy")]
    Busy(String),

    /// The client configuration file is invalid.
    #[error("invalid client config: {0}")]
    Config(#[from] serde_json::Error),

    /// The builder is missing something it needs.
    #[error("builder: {0}")]
    Builder(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let ctrl_err: CtrlwireError = err.into();
        assert!(matches!(ctrl_err, CtrlwireError::Transport(_)));
        assert!(ctrl_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_engine_error() {
        let ctrl_err: CtrlwireError = EngineError::RequestTimeout(7).into();
        assert!(matches!(ctrl_err, CtrlwireError::Engine(EngineError::RequestTimeout(7))));
        assert_eq!(ctrl_err.to_string(), "request 7 timed out");
    }

    #[test]
    fn test_from_props_error() {
        let ctrl_err: CtrlwireError = PropsError::DuplicateKey("power".into()).into();
        assert!(matches!(ctrl_err, CtrlwireError::Props(_)));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::PayloadTooLarge { len: 300, max: 255 };
        let ctrl_err: CtrlwireError = err.into();
        assert!(matches!(ctrl_err, CtrlwireError::Protocol(_)));
    }
}

//! Error types for the connection engine.

use ctrlwire_protocol::ProtocolError;

/// Errors surfaced by [`EngineHandle`](crate::EngineHandle) operations.
///
/// Lifecycle misuse (`NotInitialized`, `AlreadyInitialized`) is a caller
/// bug. `NotConnected`, `RequestTimeout` and `RequestAborted` are transient:
/// the engine recovers on its own and the caller only loses the one
/// request. `CommandFailed` is the device rejecting a command.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// `connect()` or `close()` was called before `begin()`.
    #[error("engine not initialized, call begin() first")]
    NotInitialized,

    /// `begin()` was called twice.
    #[error("engine already initialized")]
    AlreadyInitialized,

    /// A request was issued while the connection is not established.
    #[error("not connected")]
    NotConnected,

    /// The request could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// No reply arrived in time. The connection is torn down and rebuilt.
    #[error("request {0} timed out")]
    RequestTimeout(u16),

    /// The connection went away while the request was in flight.
    #[error("request {0} aborted")]
    RequestAborted(u16),

    /// The device answered with a status string other than the success
    /// token.
    #[error("command failed: {0}")]
    CommandFailed(String),

    /// Every request id is held by an outstanding request.
    #[error("no free request id")]
    RequestIdsExhausted,

    /// The engine task has stopped.
    #[error("engine shut down")]
    Shutdown,
}

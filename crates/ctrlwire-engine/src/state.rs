//! The connection state machine's states.

use std::fmt;

/// Lifecycle state of the connection engine.
///
/// ```text
/// Uninitialized ──begin()──→ Disconnected ──connect()──→ Connecting ──open──→ Connected
///                                                           ↑    │                │
///                                                      timer│    │error      error│
///                                                           │    ↓                │
///                                                        Reconnecting ←───────────┘
/// ```
///
/// `close()` from any state after `begin()` lands in `Disconnected` and
/// cancels a scheduled reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// `begin()` has not been called yet.
    Uninitialized,
    /// Idle; nothing scheduled.
    Disconnected,
    /// A socket is being opened.
    Connecting,
    /// The socket is open and requests may be sent.
    Connected,
    /// The socket failed and a reconnect attempt is scheduled.
    Reconnecting,
}

impl ConnectionState {
    /// Returns `true` if requests can be sent.
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Reconnecting => write!(f, "reconnecting"),
        }
    }
}

/// One transition, as broadcast by [`EngineHandle::state_changes`].
///
/// Unlike the `watch` channel, the broadcast keeps every step, so a full
/// `Connected → Reconnecting → Connected` cycle is never folded into a
/// single observed value.
///
/// [`EngineHandle::state_changes`]: crate::EngineHandle::state_changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

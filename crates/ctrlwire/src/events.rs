//! Events published by a [`ControlClient`](crate::ControlClient).

use ctrlwire_props::PropertyPath;
use ctrlwire_protocol::Value;

/// Why a property's value in the snapshot changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// `set()` was called; the write may still be in flight.
    Local,
    /// The device pushed a notification.
    Device,
    /// A write succeeded and the device holds this value.
    Confirmed,
    /// A write failed and the value was restored.
    Reverted,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// The connection is up and the configuration has been loaded.
    Connected,
    /// The connection went down. Fired on every teardown, including
    /// failed connect attempts.
    Disconnected,
    /// The snapshot was replaced by a fresh copy from the device.
    ConfigLoaded,
    PropertyChanged {
        key: PropertyPath,
        value: Value,
        origin: ChangeOrigin,
    },
    /// A write or action for `key` went on the wire.
    CommitStarted { key: PropertyPath },
    CommitFinished { key: PropertyPath, success: bool },
}

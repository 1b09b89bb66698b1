//! # ctrlwire
//!
//! Client for devices controlled over a persistent binary control channel.
//!
//! A device (a lamp, a controller, anything with a small firmware) exposes
//! a set of properties. The client keeps one socket to it open, loads the
//! full configuration on every connect, keeps a local snapshot in sync
//! with the device's notifications, and writes changes back with
//! per-property throttling and rollback on failure.
//!
//! ## Layers
//!
//! - [`ctrlwire_transport`]: socket providers (WebSocket, in-memory).
//! - [`ctrlwire_protocol`]: frame and value codecs.
//! - [`ctrlwire_engine`]: request correlation, reconnect state machine.
//! - [`ctrlwire_props`]: property directory, paths, configuration tree.
//! - [`ctrlwire_throttle`]: the per-key throttle behind the commit path.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ctrlwire::prelude::*;
//!
//! # async fn run() -> Result<(), CtrlwireError> {
//! let directory = PropertyDirectory::from_json_str(
//!     r#"[{"key": "general", "props": [{"key": "brightness", "kind": "Uint16", "command": 32}]}]"#,
//! )?;
//! let client = ControlClient::builder()
//!     .directory(directory)
//!     .connect_websocket("ws://192.168.4.1/ws")?;
//! client.begin().await?;
//! client.set("brightness", Value::from(8000i64)).await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod commit;
mod config;
mod error;
mod events;
mod lifecycle;
pub mod logging;
mod router;
mod schema;

pub use client::{ControlClient, ControlClientBuilder};
pub use config::ClientConfig;
pub use error::CtrlwireError;
pub use events::{ChangeOrigin, ClientEvent};
pub use schema::ConfigSchema;

pub use ctrlwire_engine;
pub use ctrlwire_props;
pub use ctrlwire_protocol;
pub use ctrlwire_throttle;
pub use ctrlwire_transport;

/// Convenience re-exports for common types.
pub mod prelude {
    pub use crate::{
        ChangeOrigin, ClientConfig, ClientEvent, ConfigSchema, ControlClient,
        ControlClientBuilder, CtrlwireError,
    };
    pub use ctrlwire_engine::{ConnectionState, EngineConfig, EngineError};
    pub use ctrlwire_props::{
        ConfigNode, FieldLayout, PropertyDescriptor, PropertyDirectory, PropertyPath,
    };
    pub use ctrlwire_protocol::{Value, ValueKind};
    pub use ctrlwire_throttle::ThrottleConfig;
}

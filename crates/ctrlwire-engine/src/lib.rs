//! Connection engine for ctrlwire.
//!
//! The engine keeps one socket to the device alive. It owns:
//!
//! - **The state machine** ([`ConnectionState`]): begin, connect, close,
//!   and automatic reconnects with linear backoff.
//! - **Request correlation**: every request gets a fresh id, and the reply
//!   carrying that id completes it. A request that outlives the configured
//!   timeout is treated as a dead connection and triggers a reconnect.
//! - **Notifications**: frames with request id 0 are broadcast to every
//!   [`EngineHandle::subscribe`] receiver.
//!
//! # Architecture
//!
//! ```text
//! EngineHandle ──mpsc──→ engine actor ──Connector/Connection──→ socket
//!      ↑                     │
//!      └──oneshot reply──────┘──broadcast──→ notification subscribers
//! ```

mod backoff;
mod config;
mod engine;
mod error;
mod pending;
mod socket;
mod state;

pub use config::EngineConfig;
pub use engine::{EngineHandle, spawn_engine};
pub use error::EngineError;
pub use state::{ConnectionState, StateChange};

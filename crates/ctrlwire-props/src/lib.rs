//! Property layer for ctrlwire.
//!
//! A device exposes a set of named properties. This crate describes them
//! and holds their current values:
//!
//! - [`PropertyPath`] — a dotted key such as `sysConfig.mqttPort`.
//! - [`ConfigNode`] — the configuration tree that paths point into.
//! - [`PropertyDirectory`] — the static table of properties, grouped into
//!   [`Section`]s, that maps each one to its wire command and value kind.
//! - [`FieldLayout`] — how the device's full configuration blob is laid
//!   out, so it can be parsed into a [`ConfigNode`].
//!
//! None of this talks to a socket. The client crate ties the directory to
//! the connection engine.

mod directory;
mod error;
mod layout;
mod path;
mod tree;

pub use directory::{
    PropertyDescriptor, PropertyDirectory, PropertyRole, Section, WireCommand, WriteRequest,
};
pub use error::PropsError;
pub use layout::{FieldLayout, LayoutField};
pub use path::{PathSegment, PropertyPath};
pub use tree::ConfigNode;

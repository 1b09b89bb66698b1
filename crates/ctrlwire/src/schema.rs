//! Parsing the device's full configuration.

use ctrlwire_props::{ConfigNode, FieldLayout};
use ctrlwire_protocol::Frame;

use crate::CtrlwireError;

/// Turns the reply to `GET_CONFIG` into a configuration tree.
///
/// [`FieldLayout`] implements this for devices that send a packed struct.
/// Devices with a different format plug in their own implementation via
/// [`ControlClientBuilder::schema`](crate::ControlClientBuilder::schema).
pub trait ConfigSchema: Send + Sync + 'static {
    fn parse(&self, frame: &Frame) -> Result<ConfigNode, CtrlwireError>;
}

impl ConfigSchema for FieldLayout {
    fn parse(&self, frame: &Frame) -> Result<ConfigNode, CtrlwireError> {
        Ok(FieldLayout::parse(self, &mut frame.reader())?)
    }
}

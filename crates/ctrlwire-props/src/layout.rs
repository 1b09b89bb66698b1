//! Binary layout of the device's configuration blob.
//!
//! The response to `GET_CONFIG` is a packed struct: fields back to back,
//! little-endian, no padding. A [`FieldLayout`] lists those fields in
//! order and turns the blob into a [`ConfigNode`].

use ctrlwire_protocol::{BinaryReader, ValueKind};
use serde::Deserialize;
use tracing::trace;

use crate::{ConfigNode, PropertyDirectory, PropertyPath, PropertyRole, PropsError};

/// One field of the packed configuration blob.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LayoutField {
    pub path: PropertyPath,
    pub kind: ValueKind,
    #[serde(default)]
    pub max_length: Option<usize>,
}

/// Ordered list of fields making up the configuration blob.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct FieldLayout {
    fields: Vec<LayoutField>,
}

impl FieldLayout {
    pub fn new(fields: Vec<LayoutField>) -> Self {
        Self { fields }
    }

    /// Parses a JSON array of `{path, kind, max_length?}` objects.
    pub fn from_json_str(json: &str) -> Result<Self, PropsError> {
        Ok(serde_json::from_str(json)?)
    }

    /// A layout with one field per value property, in directory order.
    ///
    /// Pair-backed properties are read as one byte booleans.
    pub fn from_directory(directory: &PropertyDirectory) -> Self {
        let fields = directory
            .properties()
            .filter(|prop| prop.role == PropertyRole::Value)
            .map(|prop| LayoutField {
                path: prop.key.clone(),
                kind: if prop.is_pair() {
                    ValueKind::Boolean
                } else {
                    prop.kind
                },
                max_length: prop.max_length,
            })
            .collect();
        Self { fields }
    }

    pub fn fields(&self) -> &[LayoutField] {
        &self.fields
    }

    /// Reads every field from `reader` into a fresh tree.
    ///
    /// Trailing bytes after the last field are ignored.
    pub fn parse(&self, reader: &mut BinaryReader<'_>) -> Result<ConfigNode, PropsError> {
        let mut tree = ConfigNode::default();
        for field in &self.fields {
            let value = reader.read_value(field.kind, field.max_length)?;
            trace!(path = %field.path, %value, "config field");
            tree.set(&field.path, value)?;
        }
        Ok(tree)
    }
}

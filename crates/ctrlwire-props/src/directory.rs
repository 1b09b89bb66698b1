//! The property directory.
//!
//! The directory is a static table, usually loaded from JSON, that says
//! which properties a device exposes and how each maps onto the wire:
//!
//! ```json
//! [
//!   {
//!     "key": "general",
//!     "title": "General",
//!     "props": [
//!       { "key": "power", "title": "Power", "command": [16, 17] },
//!       { "key": "brightness", "command": 32, "kind": "Uint16", "limit": 16383 },
//!       { "key": "restart", "command": 251, "role": "action" }
//!     ]
//!   }
//! ]
//! ```
//!
//! Sections keep their declared order, and so do properties inside a
//! section. Notification routing relies on that order: the first matching
//! descriptor wins.

use std::collections::HashMap;

use ctrlwire_protocol::{
    BinaryReader, ProtocolError, Value, ValueKind, encode_fixed_string, encode_value,
    truncate_utf8,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{ConfigNode, PropertyPath, PropsError};

// ---------------------------------------------------------------------------
// Descriptor types
// ---------------------------------------------------------------------------

/// The command id(s) a property is written with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireCommand {
    /// One command; the value travels in the payload.
    Single(u8),
    /// A boolean backed by two zero-payload commands, `[on, off]`.
    Pair([u8; 2]),
}

impl WireCommand {
    /// Returns `true` if a notification of `frame_type` belongs to this
    /// command.
    pub fn matches(self, frame_type: u8) -> bool {
        match self {
            Self::Single(cmd) => cmd == frame_type,
            Self::Pair(pair) => pair.contains(&frame_type),
        }
    }
}

/// What a property is for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyRole {
    /// Holds a value that can be read and written.
    #[default]
    Value,
    /// A button: its command is sent with no payload and it holds no value.
    Action,
}

fn default_kind() -> ValueKind {
    ValueKind::Uint8
}

/// One controllable property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    pub key: PropertyPath,
    #[serde(default)]
    pub title: Option<String>,
    pub command: WireCommand,
    #[serde(default = "default_kind")]
    pub kind: ValueKind,
    #[serde(default)]
    pub max_length: Option<usize>,
    /// The property is only shown when the value at this path is truthy.
    #[serde(default)]
    pub visible_if: Option<PropertyPath>,
    #[serde(default)]
    pub min: Option<f64>,
    /// Upper bound for numeric values.
    #[serde(default)]
    pub limit: Option<f64>,
    #[serde(default)]
    pub role: PropertyRole,
}

/// A write ready to go on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRequest {
    pub command: u8,
    pub payload: Option<Vec<u8>>,
    /// The value the device ends up with if the write succeeds. For strings
    /// this is the truncated text that was actually sent.
    pub confirmed: Value,
}

impl PropertyDescriptor {
    /// Returns `true` if the property is backed by an on/off command pair.
    pub fn is_pair(&self) -> bool {
        matches!(self.command, WireCommand::Pair(_))
    }

    /// Converts a caller-supplied value to the form this property stores.
    ///
    /// Pairs store booleans. Numeric values are clamped to `min`/`limit`
    /// and then coerced to the property's kind.
    pub fn prepare(&self, value: Value) -> Result<Value, ProtocolError> {
        if self.is_pair() {
            return Ok(Value::Bool(value.is_truthy()));
        }
        if self.kind.is_string() {
            return value.coerce(self.kind);
        }
        value.clamped(self.min, self.limit).coerce(self.kind)
    }

    /// Builds the request that writes `value`, which must already be
    /// [prepared](Self::prepare).
    pub fn encode_write(&self, value: &Value) -> Result<WriteRequest, ProtocolError> {
        let cmd = match self.command {
            WireCommand::Pair([on, off]) => {
                let on_state = value.is_truthy();
                return Ok(WriteRequest {
                    command: if on_state { on } else { off },
                    payload: None,
                    confirmed: Value::Bool(on_state),
                });
            }
            WireCommand::Single(cmd) => cmd,
        };

        let (payload, confirmed) = match (self.kind, value) {
            (ValueKind::FixedString, Value::Str(s)) => {
                let n = self
                    .max_length
                    .ok_or(ProtocolError::MissingWidth(self.kind))?;
                let bytes = encode_fixed_string(s, n);
                let sent = BinaryReader::new(&bytes).read_fixed_string(n)?;
                (bytes, Value::Str(sent))
            }
            (ValueKind::NullTerminatedString, Value::Str(s)) => {
                let sent = match self.max_length {
                    Some(n) => truncate_utf8(s, n),
                    None => s.as_str(),
                };
                let bytes = encode_value(self.kind, value, self.max_length)?;
                (bytes, Value::Str(sent.to_string()))
            }
            _ => (
                encode_value(self.kind, value, self.max_length)?,
                value.clone(),
            ),
        };

        Ok(WriteRequest {
            command: cmd,
            payload: Some(payload),
            confirmed,
        })
    }

    /// The command an action property sends. For a pair, the `on` command.
    pub fn action_command(&self) -> u8 {
        match self.command {
            WireCommand::Single(cmd) => cmd,
            WireCommand::Pair([on, _]) => on,
        }
    }

    /// Decodes the value carried by a notification of `frame_type`.
    ///
    /// For a pair the payload is ignored: the frame type alone says whether
    /// the property is on.
    pub fn decode_notification(
        &self,
        frame_type: u8,
        reader: &mut BinaryReader<'_>,
    ) -> Result<Value, ProtocolError> {
        match self.command {
            WireCommand::Pair([on, _]) => Ok(Value::Bool(on == frame_type)),
            WireCommand::Single(_) => reader.read_value(self.kind, self.max_length),
        }
    }
}

/// An ordered group of properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub key: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub collapse: bool,
    #[serde(default)]
    pub lock: bool,
    #[serde(default)]
    pub visible_if: Option<PropertyPath>,
    #[serde(default)]
    pub props: Vec<PropertyDescriptor>,
}

// ---------------------------------------------------------------------------
// PropertyDirectory
// ---------------------------------------------------------------------------

/// Read-only lookup over a list of [`Section`]s.
#[derive(Debug, Clone, Default)]
pub struct PropertyDirectory {
    sections: Vec<Section>,
    /// Property key -> (section index, property index).
    index: HashMap<String, (usize, usize)>,
}

impl PropertyDirectory {
    /// Builds a directory, rejecting duplicate property keys.
    ///
    /// Sections without properties are dropped.
    pub fn from_sections(sections: Vec<Section>) -> Result<Self, PropsError> {
        let sections: Vec<Section> = sections
            .into_iter()
            .filter(|section| {
                if section.props.is_empty() {
                    debug!(section = %section.key, "skipping empty section");
                }
                !section.props.is_empty()
            })
            .collect();

        let mut index = HashMap::new();
        for (s, section) in sections.iter().enumerate() {
            for (p, prop) in section.props.iter().enumerate() {
                let key = prop.key.to_string();
                if index.insert(key.clone(), (s, p)).is_some() {
                    return Err(PropsError::DuplicateKey(key));
                }
            }
        }

        Ok(Self { sections, index })
    }

    /// Parses a JSON array of sections.
    pub fn from_json_str(json: &str) -> Result<Self, PropsError> {
        let sections: Vec<Section> = serde_json::from_str(json)?;
        Self::from_sections(sections)
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// All properties in directory order.
    pub fn properties(&self) -> impl Iterator<Item = &PropertyDescriptor> {
        self.sections.iter().flat_map(|section| section.props.iter())
    }

    pub fn find(&self, key: &str) -> Option<&PropertyDescriptor> {
        let &(s, p) = self.index.get(key)?;
        self.sections.get(s)?.props.get(p)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Finds the property a notification of `frame_type` updates.
    ///
    /// The first value property, in directory order, whose command matches
    /// and whose visibility predicate holds against `snapshot`.
    ///
    /// The predicate is checked for on/off pairs exactly as for single
    /// commands. A hidden pair never claims a notification, so two pairs
    /// sharing codes resolve the same way two single commands do.
    pub fn route(&self, frame_type: u8, snapshot: &ConfigNode) -> Option<&PropertyDescriptor> {
        self.properties().find(|prop| {
            prop.role == PropertyRole::Value
                && prop.command.matches(frame_type)
                && predicate_holds(prop.visible_if.as_ref(), snapshot)
        })
    }

    /// Whether `key` is visible: both its section's predicate and its own
    /// hold. `None` for unknown keys.
    pub fn is_visible(&self, key: &str, snapshot: &ConfigNode) -> Option<bool> {
        let &(s, p) = self.index.get(key)?;
        let section = self.sections.get(s)?;
        let prop = section.props.get(p)?;
        Some(
            predicate_holds(section.visible_if.as_ref(), snapshot)
                && predicate_holds(prop.visible_if.as_ref(), snapshot),
        )
    }

    /// Whether the section `key` is visible. `None` for unknown sections.
    pub fn is_section_visible(&self, key: &str, snapshot: &ConfigNode) -> Option<bool> {
        let section = self.sections.iter().find(|section| section.key == key)?;
        Some(predicate_holds(section.visible_if.as_ref(), snapshot))
    }
}

/// An absent predicate always holds. A present one holds when the value at
/// its path is truthy; containers count as truthy, missing paths do not.
fn predicate_holds(visible_if: Option<&PropertyPath>, snapshot: &ConfigNode) -> bool {
    let Some(path) = visible_if else {
        return true;
    };
    match snapshot.get(path) {
        Some(ConfigNode::Scalar(value)) => value.is_truthy(),
        Some(_) => true,
        None => false,
    }
}

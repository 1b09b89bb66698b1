//! The in-memory configuration tree.
//!
//! A [`ConfigNode`] is a tagged union of object, array and scalar. Reading
//! or writing a property walks its [`PropertyPath`] one segment at a time.

use std::collections::BTreeMap;

use ctrlwire_protocol::Value;
use serde::Serialize;

use crate::{PathSegment, PropertyPath, PropsError};

/// A node of the configuration tree.
///
/// Serializes as plain JSON, which is handy for dumping a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConfigNode {
    Object(BTreeMap<String, ConfigNode>),
    Array(Vec<ConfigNode>),
    Scalar(Value),
}

impl Default for ConfigNode {
    fn default() -> Self {
        Self::Object(BTreeMap::new())
    }
}

impl ConfigNode {
    /// The node at `path`, if present.
    pub fn get(&self, path: &PropertyPath) -> Option<&ConfigNode> {
        path.segments()
            .iter()
            .try_fold(self, |node, segment| node.child(segment))
    }

    /// The scalar at `path`, if present.
    pub fn get_value(&self, path: &PropertyPath) -> Option<&Value> {
        match self.get(path)? {
            Self::Scalar(value) => Some(value),
            _ => None,
        }
    }

    /// Writes `value` at `path`, returning the scalar it replaced.
    ///
    /// Missing intermediate nodes are created: an object before a field
    /// segment, an array before an index segment. An array can only grow
    /// by appending at index `len`.
    pub fn set(&mut self, path: &PropertyPath, value: Value) -> Result<Option<Value>, PropsError> {
        let segments = path.segments();
        let Some((last, parents)) = segments.split_last() else {
            return Err(PropsError::InvalidPath(String::new()));
        };

        let mut node = self;
        for (depth, segment) in parents.iter().enumerate() {
            let fresh = match &segments[depth + 1] {
                PathSegment::Field(_) => ConfigNode::Object(BTreeMap::new()),
                PathSegment::Index(_) => ConfigNode::Array(Vec::new()),
            };
            node = node.slot(segment, fresh, path, depth)?;
        }

        let fresh = ConfigNode::Scalar(value.clone());
        let slot = node.slot(last, fresh, path, parents.len())?;
        match std::mem::replace(slot, ConfigNode::Scalar(value)) {
            ConfigNode::Scalar(previous) => Ok(Some(previous)),
            _ => Ok(None),
        }
    }

    fn child(&self, segment: &PathSegment) -> Option<&ConfigNode> {
        match (self, segment) {
            (Self::Object(map), PathSegment::Field(name)) => map.get(name),
            (Self::Object(map), PathSegment::Index(i)) => map.get(&i.to_string()),
            (Self::Array(items), PathSegment::Index(i)) => items.get(*i),
            _ => None,
        }
    }

    /// The child slot for `segment`, inserting `fresh` if it does not exist.
    ///
    /// `depth` is the number of segments already walked.
    fn slot(
        &mut self,
        segment: &PathSegment,
        fresh: ConfigNode,
        path: &PropertyPath,
        depth: usize,
    ) -> Result<&mut ConfigNode, PropsError> {
        match (self, segment) {
            (Self::Object(map), PathSegment::Field(name)) => {
                Ok(map.entry(name.clone()).or_insert(fresh))
            }
            (Self::Object(map), PathSegment::Index(i)) => {
                Ok(map.entry(i.to_string()).or_insert(fresh))
            }
            (Self::Array(items), PathSegment::Index(i)) => {
                let len = items.len();
                if *i == len {
                    items.push(fresh);
                }
                items.get_mut(*i).ok_or_else(|| PropsError::IndexOutOfBounds {
                    path: path.prefix(depth),
                    index: *i,
                    len,
                })
            }
            (Self::Array(_), PathSegment::Field(_)) | (Self::Scalar(_), _) => {
                Err(PropsError::NotAContainer(path.prefix(depth)))
            }
        }
    }
}

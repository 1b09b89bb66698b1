//! Dotted property paths.
//!
//! A property key such as `nightMode.brightness` or `zones.2.color` is
//! parsed once into a list of segments. Purely numeric segments are array
//! indices; everything else is an object field.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::PropsError;

/// One step of a [`PropertyPath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) => f.write_str(name),
            Self::Index(i) => write!(f, "{i}"),
        }
    }
}

/// A parsed dot-separated path into a configuration tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PropertyPath(Vec<PathSegment>);

impl PropertyPath {
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    /// The path made of the first `len` segments, for error messages.
    pub(crate) fn prefix(&self, len: usize) -> String {
        PropertyPath(self.0[..len].to_vec()).to_string()
    }
}

impl FromStr for PropertyPath {
    type Err = PropsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let segments = s
            .split('.')
            .map(|part| {
                if part.is_empty() {
                    Err(PropsError::InvalidPath(s.to_string()))
                } else if part.bytes().all(|b| b.is_ascii_digit()) {
                    part.parse()
                        .map(PathSegment::Index)
                        .map_err(|_| PropsError::InvalidPath(s.to_string()))
                } else {
                    Ok(PathSegment::Field(part.to_string()))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self(segments))
    }
}

impl TryFrom<String> for PropertyPath {
    type Error = PropsError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<PropertyPath> for String {
    fn from(path: PropertyPath) -> Self {
        path.to_string()
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

//! Typed scalar values and their little-endian wire encoding.
//!
//! The kind table is closed: every property a device exposes is one of the
//! [`ValueKind`] variants. Numeric kinds have a fixed width; the two string
//! kinds are sized by the property's `max_length` instead.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// The wire representation of a property value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Boolean,
    Uint8,
    Int8,
    Uint16,
    Int16,
    Uint32,
    Int32,
    BigUint64,
    BigInt64,
    Float32,
    Float64,
    /// Zero padded to exactly `max_length` bytes.
    FixedString,
    /// Terminated by a single zero byte.
    NullTerminatedString,
}

impl ValueKind {
    /// Byte width of the kind, or `None` for string kinds.
    pub fn width(self) -> Option<usize> {
        match self {
            Self::Boolean | Self::Uint8 | Self::Int8 => Some(1),
            Self::Uint16 | Self::Int16 => Some(2),
            Self::Uint32 | Self::Int32 | Self::Float32 => Some(4),
            Self::BigUint64 | Self::BigInt64 | Self::Float64 => Some(8),
            Self::FixedString | Self::NullTerminatedString => None,
        }
    }

    /// Returns `true` for the two string kinds.
    pub fn is_string(self) -> bool {
        matches!(self, Self::FixedString | Self::NullTerminatedString)
    }

    /// The variant name, as used in directory files.
    pub fn name(self) -> &'static str {
        match self {
            Self::Boolean => "Boolean",
            Self::Uint8 => "Uint8",
            Self::Int8 => "Int8",
            Self::Uint16 => "Uint16",
            Self::Int16 => "Int16",
            Self::Uint32 => "Uint32",
            Self::Int32 => "Int32",
            Self::BigUint64 => "BigUint64",
            Self::BigInt64 => "BigInt64",
            Self::Float32 => "Float32",
            Self::Float64 => "Float64",
            Self::FixedString => "FixedString",
            Self::NullTerminatedString => "NullTerminatedString",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ValueKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        const ALL: [ValueKind; 13] = [
            ValueKind::Boolean,
            ValueKind::Uint8,
            ValueKind::Int8,
            ValueKind::Uint16,
            ValueKind::Int16,
            ValueKind::Uint32,
            ValueKind::Int32,
            ValueKind::BigUint64,
            ValueKind::BigInt64,
            ValueKind::Float32,
            ValueKind::Float64,
            ValueKind::FixedString,
            ValueKind::NullTerminatedString,
        ];
        ALL.into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| ProtocolError::UnknownValueKind(s.to_string()))
    }
}

/// A decoded property value.
///
/// Serializes untagged, so a snapshot renders as plain JSON scalars.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    F32(f32),
    F64(f64),
    Str(String),
}

impl Value {
    /// The zero value of a kind, used for fields a device has not sent yet.
    pub fn zero(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Boolean => Self::Bool(false),
            ValueKind::Uint8 => Self::U8(0),
            ValueKind::Int8 => Self::I8(0),
            ValueKind::Uint16 => Self::U16(0),
            ValueKind::Int16 => Self::I16(0),
            ValueKind::Uint32 => Self::U32(0),
            ValueKind::Int32 => Self::I32(0),
            ValueKind::BigUint64 => Self::U64(0),
            ValueKind::BigInt64 => Self::I64(0),
            ValueKind::Float32 => Self::F32(0.0),
            ValueKind::Float64 => Self::F64(0.0),
            ValueKind::FixedString | ValueKind::NullTerminatedString => {
                Self::Str(String::new())
            }
        }
    }

    /// Truthiness as used by visibility predicates: `false`, zero and the
    /// empty string are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Str(s) => !s.is_empty(),
            other => other.as_f64().is_some_and(|f| f != 0.0),
        }
    }

    /// Numeric view of the value. Booleans map to 0/1; strings have none.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::U8(v) => Some(f64::from(*v)),
            Self::I8(v) => Some(f64::from(*v)),
            Self::U16(v) => Some(f64::from(*v)),
            Self::I16(v) => Some(f64::from(*v)),
            Self::U32(v) => Some(f64::from(*v)),
            Self::I32(v) => Some(f64::from(*v)),
            Self::U64(v) => Some(*v as f64),
            Self::I64(v) => Some(*v as f64),
            Self::F32(v) => Some(f64::from(*v)),
            Self::F64(v) => Some(*v),
            Self::Str(_) => None,
        }
    }

    /// Exact integer view, for integer variants and integral floats.
    fn as_i128(&self) -> Option<i128> {
        match self {
            Self::Bool(b) => Some(i128::from(*b)),
            Self::U8(v) => Some(i128::from(*v)),
            Self::I8(v) => Some(i128::from(*v)),
            Self::U16(v) => Some(i128::from(*v)),
            Self::I16(v) => Some(i128::from(*v)),
            Self::U32(v) => Some(i128::from(*v)),
            Self::I32(v) => Some(i128::from(*v)),
            Self::U64(v) => Some(i128::from(*v)),
            Self::I64(v) => Some(i128::from(*v)),
            Self::F32(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i128),
            Self::F64(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i128),
            _ => None,
        }
    }

    /// Converts the value to the variant that matches `kind`.
    ///
    /// Integer targets accept any numeric value that is integral and in
    /// range. Float targets accept any numeric value. String kinds only
    /// accept strings.
    pub fn coerce(self, kind: ValueKind) -> Result<Self, ProtocolError> {
        let mismatch = |value: &Value| ProtocolError::ValueMismatch {
            kind,
            value: value.to_string(),
        };

        let coerced = match kind {
            ValueKind::Boolean => match &self {
                Self::Bool(b) => Some(Self::Bool(*b)),
                Self::Str(_) => None,
                other => other.as_f64().map(|f| Self::Bool(f != 0.0)),
            },
            ValueKind::Uint8 => self.as_i128().and_then(|i| u8::try_from(i).ok()).map(Self::U8),
            ValueKind::Int8 => self.as_i128().and_then(|i| i8::try_from(i).ok()).map(Self::I8),
            ValueKind::Uint16 => {
                self.as_i128().and_then(|i| u16::try_from(i).ok()).map(Self::U16)
            }
            ValueKind::Int16 => {
                self.as_i128().and_then(|i| i16::try_from(i).ok()).map(Self::I16)
            }
            ValueKind::Uint32 => {
                self.as_i128().and_then(|i| u32::try_from(i).ok()).map(Self::U32)
            }
            ValueKind::Int32 => {
                self.as_i128().and_then(|i| i32::try_from(i).ok()).map(Self::I32)
            }
            ValueKind::BigUint64 => {
                self.as_i128().and_then(|i| u64::try_from(i).ok()).map(Self::U64)
            }
            ValueKind::BigInt64 => {
                self.as_i128().and_then(|i| i64::try_from(i).ok()).map(Self::I64)
            }
            ValueKind::Float32 => self.as_f64().map(|f| Self::F32(f as f32)),
            ValueKind::Float64 => self.as_f64().map(Self::F64),
            ValueKind::FixedString | ValueKind::NullTerminatedString => match &self {
                Self::Str(s) => Some(Self::Str(s.clone())),
                _ => None,
            },
        };

        coerced.ok_or_else(|| mismatch(&self))
    }

    /// Clamps a numeric value into `[min, max]`.
    ///
    /// Returns the value unchanged when it is already in range or not
    /// numeric. A clamped value comes back as `F64`; callers coerce it to
    /// the property's kind afterwards.
    pub fn clamped(self, min: Option<f64>, max: Option<f64>) -> Self {
        let Some(f) = self.as_f64() else {
            return self;
        };
        if matches!(self, Self::Bool(_)) {
            return self;
        }
        let mut bounded = f;
        if let Some(min) = min {
            bounded = bounded.max(min);
        }
        if let Some(max) = max {
            bounded = bounded.min(max);
        }
        if bounded == f { self } else { Self::F64(bounded) }
    }

    /// The string payload, if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::U8(v) => write!(f, "{v}"),
            Self::I8(v) => write!(f, "{v}"),
            Self::U16(v) => write!(f, "{v}"),
            Self::I16(v) => write!(f, "{v}"),
            Self::U32(v) => write!(f, "{v}"),
            Self::I32(v) => write!(f, "{v}"),
            Self::U64(v) => write!(f, "{v}"),
            Self::I64(v) => write!(f, "{v}"),
            Self::F32(v) => write!(f, "{v}"),
            Self::F64(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::I64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::F64(v)
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// A forward-only little-endian cursor over a byte slice.
#[derive(Debug, Clone)]
pub struct BinaryReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

macro_rules! read_le {
    ($name:ident, $ty:ty) => {
        #[doc = concat!("Reads a little-endian `", stringify!($ty), "`.")]
        pub fn $name(&mut self) -> Result<$ty, ProtocolError> {
            Ok(<$ty>::from_le_bytes(self.read_array()?))
        }
    };
}

impl<'a> BinaryReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        if n > self.remaining() {
            return Err(ProtocolError::Truncated {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], ProtocolError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Reads one byte as a boolean: only `1` is `true`.
    pub fn read_bool(&mut self) -> Result<bool, ProtocolError> {
        Ok(self.read_u8()? == 1)
    }

    read_le!(read_u8, u8);
    read_le!(read_i8, i8);
    read_le!(read_u16, u16);
    read_le!(read_i16, i16);
    read_le!(read_u32, u32);
    read_le!(read_i32, i32);
    read_le!(read_u64, u64);
    read_le!(read_i64, i64);
    read_le!(read_f32, f32);
    read_le!(read_f64, f64);

    /// Reads a zero-padded string field of exactly `n` bytes.
    ///
    /// The text ends at the first zero byte; the cursor always advances by
    /// the full `n`.
    pub fn read_fixed_string(&mut self, n: usize) -> Result<String, ProtocolError> {
        let field = self.take(n)?;
        let end = field.iter().position(|&b| b == 0).unwrap_or(n);
        Ok(String::from_utf8_lossy(&field[..end]).into_owned())
    }

    /// Reads bytes up to a zero terminator and consumes the terminator.
    pub fn read_null_terminated_string(&mut self) -> Result<String, ProtocolError> {
        let rest = &self.buf[self.pos..];
        let Some(end) = rest.iter().position(|&b| b == 0) else {
            return Err(ProtocolError::Truncated {
                needed: rest.len() + 1,
                remaining: rest.len(),
            });
        };
        let text = String::from_utf8_lossy(&rest[..end]).into_owned();
        self.pos += end + 1;
        Ok(text)
    }

    /// Reads one value of the given kind.
    ///
    /// `max_length` is required for [`ValueKind::FixedString`] and ignored
    /// otherwise.
    pub fn read_value(
        &mut self,
        kind: ValueKind,
        max_length: Option<usize>,
    ) -> Result<Value, ProtocolError> {
        Ok(match kind {
            ValueKind::Boolean => Value::Bool(self.read_bool()?),
            ValueKind::Uint8 => Value::U8(self.read_u8()?),
            ValueKind::Int8 => Value::I8(self.read_i8()?),
            ValueKind::Uint16 => Value::U16(self.read_u16()?),
            ValueKind::Int16 => Value::I16(self.read_i16()?),
            ValueKind::Uint32 => Value::U32(self.read_u32()?),
            ValueKind::Int32 => Value::I32(self.read_i32()?),
            ValueKind::BigUint64 => Value::U64(self.read_u64()?),
            ValueKind::BigInt64 => Value::I64(self.read_i64()?),
            ValueKind::Float32 => Value::F32(self.read_f32()?),
            ValueKind::Float64 => Value::F64(self.read_f64()?),
            ValueKind::FixedString => {
                let n = max_length.ok_or(ProtocolError::MissingWidth(kind))?;
                Value::Str(self.read_fixed_string(n)?)
            }
            ValueKind::NullTerminatedString => {
                Value::Str(self.read_null_terminated_string()?)
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encodes `value` as `kind`.
///
/// The value must already have the matching variant (see
/// [`Value::coerce`]). String kinds are cut to `max_length` bytes when one
/// is given; `FixedString` is then zero padded to exactly that width and
/// `NullTerminatedString` gets a trailing zero byte.
pub fn encode_value(
    kind: ValueKind,
    value: &Value,
    max_length: Option<usize>,
) -> Result<Vec<u8>, ProtocolError> {
    let bytes = match (kind, value) {
        (ValueKind::Boolean, Value::Bool(v)) => vec![u8::from(*v)],
        (ValueKind::Uint8, Value::U8(v)) => v.to_le_bytes().to_vec(),
        (ValueKind::Int8, Value::I8(v)) => v.to_le_bytes().to_vec(),
        (ValueKind::Uint16, Value::U16(v)) => v.to_le_bytes().to_vec(),
        (ValueKind::Int16, Value::I16(v)) => v.to_le_bytes().to_vec(),
        (ValueKind::Uint32, Value::U32(v)) => v.to_le_bytes().to_vec(),
        (ValueKind::Int32, Value::I32(v)) => v.to_le_bytes().to_vec(),
        (ValueKind::BigUint64, Value::U64(v)) => v.to_le_bytes().to_vec(),
        (ValueKind::BigInt64, Value::I64(v)) => v.to_le_bytes().to_vec(),
        (ValueKind::Float32, Value::F32(v)) => v.to_le_bytes().to_vec(),
        (ValueKind::Float64, Value::F64(v)) => v.to_le_bytes().to_vec(),
        (ValueKind::FixedString, Value::Str(s)) => {
            let n = max_length.ok_or(ProtocolError::MissingWidth(kind))?;
            encode_fixed_string(s, n)
        }
        (ValueKind::NullTerminatedString, Value::Str(s)) => {
            let text = match max_length {
                Some(n) => truncate_utf8(s, n),
                None => s.as_str(),
            };
            let mut out = Vec::with_capacity(text.len() + 1);
            out.extend_from_slice(text.as_bytes());
            out.push(0);
            out
        }
        (kind, value) => {
            return Err(ProtocolError::ValueMismatch {
                kind,
                value: value.to_string(),
            });
        }
    };
    Ok(bytes)
}

/// Encodes `s` into exactly `n` bytes: truncated if longer, zero padded if
/// shorter.
///
/// Truncation never splits a UTF-8 sequence; a partial trailing character
/// is dropped and replaced by padding.
pub fn encode_fixed_string(s: &str, n: usize) -> Vec<u8> {
    let text = truncate_utf8(s, n);
    let mut out = vec![0u8; n];
    out[..text.len()].copy_from_slice(text.as_bytes());
    out
}

/// Longest prefix of `s` that fits in `n` bytes on a char boundary.
pub fn truncate_utf8(s: &str, n: usize) -> &str {
    if s.len() <= n {
        return s;
    }
    let mut end = n;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // ValueKind
    // =========================================================================

    #[test]
    fn test_kind_widths() {
        let widths: Vec<_> = [
            ValueKind::Boolean,
            ValueKind::Uint8,
            ValueKind::Int8,
            ValueKind::Uint16,
            ValueKind::Int16,
            ValueKind::Uint32,
            ValueKind::Int32,
            ValueKind::BigUint64,
            ValueKind::BigInt64,
            ValueKind::Float32,
            ValueKind::Float64,
        ]
        .into_iter()
        .map(|k| k.width().unwrap())
        .collect();
        assert_eq!(widths, [1, 1, 1, 2, 2, 4, 4, 8, 8, 4, 8]);
        assert_eq!(ValueKind::FixedString.width(), None);
    }

    #[test]
    fn test_kind_from_str_known_and_unknown() {
        assert_eq!("Uint16".parse::<ValueKind>().unwrap(), ValueKind::Uint16);
        assert_eq!(
            "FixedString".parse::<ValueKind>().unwrap(),
            ValueKind::FixedString
        );
        let err = "Uint24".parse::<ValueKind>().unwrap_err();
        assert_eq!(err, ProtocolError::UnknownValueKind("Uint24".into()));
    }

    #[test]
    fn test_kind_serde_uses_variant_names() {
        let kind: ValueKind = serde_json::from_str("\"BigInt64\"").unwrap();
        assert_eq!(kind, ValueKind::BigInt64);
        assert!(serde_json::from_str::<ValueKind>("\"Uint128\"").is_err());
    }

    // =========================================================================
    // Value
    // =========================================================================

    #[test]
    fn test_coerce_integer_in_range() {
        let v = Value::I64(200).coerce(ValueKind::Uint8).unwrap();
        assert_eq!(v, Value::U8(200));
        let v = Value::F64(-3.0).coerce(ValueKind::Int16).unwrap();
        assert_eq!(v, Value::I16(-3));
    }

    #[test]
    fn test_coerce_rejects_out_of_range_and_fractions() {
        assert!(Value::I64(256).coerce(ValueKind::Uint8).is_err());
        assert!(Value::I64(-1).coerce(ValueKind::Uint32).is_err());
        assert!(Value::F64(1.5).coerce(ValueKind::Int32).is_err());
        assert!(Value::Str("x".into()).coerce(ValueKind::Uint8).is_err());
        assert!(Value::U8(1).coerce(ValueKind::FixedString).is_err());
    }

    #[test]
    fn test_coerce_boolean_from_number() {
        assert_eq!(
            Value::U8(0).coerce(ValueKind::Boolean).unwrap(),
            Value::Bool(false)
        );
        assert_eq!(
            Value::I64(5).coerce(ValueKind::Boolean).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_clamped_bounds() {
        assert_eq!(
            Value::I64(300).clamped(Some(0.0), Some(255.0)),
            Value::F64(255.0)
        );
        assert_eq!(Value::I64(-4).clamped(Some(0.0), None), Value::F64(0.0));
        assert_eq!(Value::U8(7).clamped(Some(0.0), Some(10.0)), Value::U8(7));
        assert_eq!(
            Value::Str("a".into()).clamped(Some(1.0), Some(2.0)),
            Value::Str("a".into())
        );
    }

    #[test]
    fn test_truthiness() {
        assert!(Value::Bool(true).is_truthy());
        assert!(!Value::U8(0).is_truthy());
        assert!(Value::I16(-1).is_truthy());
        assert!(!Value::Str(String::new()).is_truthy());
    }

    #[test]
    fn test_value_serializes_untagged() {
        assert_eq!(serde_json::to_string(&Value::U16(8000)).unwrap(), "8000");
        assert_eq!(
            serde_json::to_string(&Value::Str("ok".into())).unwrap(),
            "\"ok\""
        );
    }

    // =========================================================================
    // BinaryReader
    // =========================================================================

    #[test]
    fn test_reader_little_endian() {
        let buf = [0x40, 0x1f, 0xff, 0x01, 0x00, 0x00, 0x00];
        let mut r = BinaryReader::new(&buf);
        assert_eq!(r.read_u16().unwrap(), 0x1f40);
        assert_eq!(r.read_i8().unwrap(), -1);
        assert_eq!(r.read_u32().unwrap(), 1);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_reader_bool_only_one_is_true() {
        let mut r = BinaryReader::new(&[1, 2, 0]);
        assert!(r.read_bool().unwrap());
        assert!(!r.read_bool().unwrap());
        assert!(!r.read_bool().unwrap());
    }

    #[test]
    fn test_reader_truncated() {
        let mut r = BinaryReader::new(&[1, 2, 3]);
        assert_eq!(
            r.read_u32().unwrap_err(),
            ProtocolError::Truncated {
                needed: 4,
                remaining: 3
            }
        );
        // A failed read consumes nothing.
        assert_eq!(r.position(), 0);
    }

    #[test]
    fn test_fixed_string_always_advances_full_width() {
        let buf = [b'h', b'i', 0, 0, 0, 0x2a];
        let mut r = BinaryReader::new(&buf);
        assert_eq!(r.read_fixed_string(5).unwrap(), "hi");
        assert_eq!(r.position(), 5);
        assert_eq!(r.read_u8().unwrap(), 0x2a);
    }

    #[test]
    fn test_fixed_string_without_terminator_uses_full_width() {
        let mut r = BinaryReader::new(b"abcdef");
        assert_eq!(r.read_fixed_string(4).unwrap(), "abcd");
        assert_eq!(r.position(), 4);
    }

    #[test]
    fn test_null_terminated_string_consumes_terminator() {
        let mut r = BinaryReader::new(b"net\0x");
        assert_eq!(r.read_null_terminated_string().unwrap(), "net");
        assert_eq!(r.position(), 4);

        let mut r = BinaryReader::new(b"open");
        assert!(r.read_null_terminated_string().is_err());
    }

    #[test]
    fn test_read_value_fixed_string_needs_width() {
        let mut r = BinaryReader::new(b"abc");
        assert_eq!(
            r.read_value(ValueKind::FixedString, None).unwrap_err(),
            ProtocolError::MissingWidth(ValueKind::FixedString)
        );
    }

    // =========================================================================
    // Encoding
    // =========================================================================

    #[test]
    fn test_encode_scalars() {
        assert_eq!(
            encode_value(ValueKind::Uint16, &Value::U16(0x1f40), None).unwrap(),
            [0x40, 0x1f]
        );
        assert_eq!(
            encode_value(ValueKind::Boolean, &Value::Bool(true), None).unwrap(),
            [1]
        );
        assert_eq!(
            encode_value(ValueKind::Float32, &Value::F32(1.0), None).unwrap(),
            1.0f32.to_le_bytes()
        );
    }

    #[test]
    fn test_encode_mismatched_variant() {
        let err = encode_value(ValueKind::Uint8, &Value::U16(1), None).unwrap_err();
        assert!(matches!(err, ProtocolError::ValueMismatch { .. }));
    }

    #[test]
    fn test_fixed_string_short_round_trip() {
        let bytes = encode_fixed_string("wifi", 8);
        assert_eq!(bytes.len(), 8);
        let mut r = BinaryReader::new(&bytes);
        assert_eq!(r.read_fixed_string(8).unwrap(), "wifi");
    }

    #[test]
    fn test_fixed_string_long_truncates_to_window() {
        let bytes = encode_fixed_string("overlong-name", 6);
        assert_eq!(bytes, b"overlo");
        let mut r = BinaryReader::new(&bytes);
        assert_eq!(r.read_fixed_string(6).unwrap(), "overlo");
    }

    #[test]
    fn test_fixed_string_truncates_on_char_boundary() {
        // "é" is two bytes; a 2-byte window cannot hold "aé".
        let bytes = encode_fixed_string("aé", 2);
        assert_eq!(bytes, [b'a', 0]);
    }

    #[test]
    fn test_null_terminated_encoding() {
        let bytes =
            encode_value(ValueKind::NullTerminatedString, &Value::from("abc"), Some(2))
                .unwrap();
        assert_eq!(bytes, [b'a', b'b', 0]);
    }
}

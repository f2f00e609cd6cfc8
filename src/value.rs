//! Cell values read from an output table.
//!
//! Both backends decode into the same small set of variants so that record
//! sets from either store compare equal when they hold the same data.

use serde::{Deserialize, Serialize};

/// A single stored cell.
///
/// # Examples
///
/// ```
/// use simcheck::Value;
///
/// let id = Value::Int(7);
/// let qty = Value::Float(10.0);
/// let spec = Value::from(":agents:Source");
///
/// assert_eq!(id.as_int(), Some(7));
/// assert_eq!(qty.as_float(), Some(10.0));
/// assert_eq!(spec.as_text(), Some(":agents:Source"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// 64-bit signed integer.
    Int(i64),
    /// Double precision float.
    Float(f64),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes, such as 16-byte simulation ids.
    Blob(Vec<u8>),
    /// SQL NULL.
    Null,
}

impl Value {
    /// True for [`Value::Int`].
    pub const fn is_int(&self) -> bool {
        matches!(self, Self::Int(_))
    }

    /// True for [`Value::Float`].
    pub const fn is_float(&self) -> bool {
        matches!(self, Self::Float(_))
    }

    /// True for [`Value::Text`].
    pub const fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }

    /// True for [`Value::Blob`].
    pub const fn is_blob(&self) -> bool {
        matches!(self, Self::Blob(_))
    }

    /// True for [`Value::Null`].
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The integer, if this is one. Floats are not truncated.
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Integers widen to floats; nothing else converts.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Text, or a blob that happens to be valid UTF-8.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            Self::Blob(v) => std::str::from_utf8(v).ok(),
            _ => None,
        }
    }

    /// Blob bytes, or the UTF-8 bytes of text.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Blob(v) => Some(v),
            Self::Text(v) => Some(v.as_bytes()),
            _ => None,
        }
    }

    /// Returns a human-readable type name.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Blob(_) => "blob",
            Self::Null => "null",
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::Null
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v:?}"),
            Self::Blob(v) => write!(f, "blob[{}]", v.len()),
            Self::Null => write!(f, "null"),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Blob(v)
    }
}

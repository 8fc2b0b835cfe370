//! Request-derived values that matchers compare against.

use std::borrow::Cow;
use std::fmt;

use bytes::Bytes;

/// A value extracted from an incoming request by a [`Selector`](crate::request::Selector).
///
/// Absence is modelled outside of this type: selectors yield `Option<Value>`
/// and `None` means the request did not carry the selected part at all.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// UTF-8 text such as a path, method or header value.
    Text(String),
    /// Raw bytes, typically a request body.
    Bytes(Bytes),
    /// A structured JSON document.
    Json(serde_json::Value),
    /// Several values for the same key (repeated headers or query params).
    List(Vec<Value>),
}

impl Value {
    /// Borrow the raw byte representation of scalar values.
    ///
    /// # Returns
    ///
    /// Returns `Some` for text and bytes, `None` for JSON documents and lists.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Text(text) => Some(text.as_bytes()),
            Self::Bytes(bytes) => Some(bytes),
            Self::Json(_) | Self::List(_) => None,
        }
    }

    /// Interpret the value as text.
    ///
    /// # Returns
    ///
    /// Returns the textual form of the value.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem when the bytes are not valid
    /// UTF-8 or the value is a list.
    pub fn as_text(&self) -> Result<Cow<'_, str>, String> {
        match self {
            Self::Text(text) => Ok(Cow::Borrowed(text)),
            Self::Bytes(bytes) => std::str::from_utf8(bytes)
                .map(Cow::Borrowed)
                .map_err(|e| format!("value is not valid UTF-8: {e}")),
            Self::Json(serde_json::Value::String(text)) => Ok(Cow::Borrowed(text)),
            Self::Json(doc) => Ok(Cow::Owned(doc.to_string())),
            Self::List(_) => Err("a list of values cannot be read as text".to_string()),
        }
    }

    /// Iterate over the scalar members of the value.
    ///
    /// Lists yield their items, every other variant yields itself.
    pub fn items(&self) -> impl Iterator<Item = &Value> {
        let items: Box<dyn Iterator<Item = &Value>> = match self {
            Self::List(values) => Box::new(values.iter()),
            other => Box::new(std::iter::once(other)),
        };
        items
    }

    /// Deep structural comparison.
    ///
    /// Text and bytes compare by their byte content, element-wise and length
    /// sensitive, so two zero-length sequences are equal. Lists compare
    /// pairwise and JSON documents structurally.
    pub fn deep_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Json(a), Self::Json(b)) => a == b,
            (Self::Json(serde_json::Value::String(a)), Self::Text(b))
            | (Self::Text(b), Self::Json(serde_json::Value::String(a))) => a == b,
            (Self::List(a), Self::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.deep_eq(y))
            }
            (a, b) => match (a.as_bytes(), b.as_bytes()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => write!(f, "{text:?}"),
            Self::Bytes(bytes) => match std::str::from_utf8(bytes) {
                Ok(text) => write!(f, "{text:?}"),
                Err(_) => write!(f, "<{} bytes>", bytes.len()),
            },
            Self::Json(doc) => write!(f, "{doc}"),
            Self::List(values) => {
                f.write_str("[")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{value}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Bytes> for Value {
    fn from(value: Bytes) -> Self {
        Self::Bytes(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(value))
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Self::Bytes(Bytes::copy_from_slice(value))
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

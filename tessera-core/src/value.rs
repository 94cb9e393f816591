//! Attribute value model
//!
//! The backend is a wide-column store: every row ("item") is a map from
//! attribute name to a typed scalar, set, list, or nested map. Numbers travel
//! as strings, the way the backend wire format represents them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single item: attribute name to attribute value
pub type Item = HashMap<String, AttributeValue>;

/// A typed attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    /// String
    S(String),
    /// Number (decimal string form, as on the wire)
    N(String),
    /// Binary
    B(Vec<u8>),
    /// Boolean
    Bool(bool),
    /// Null
    Null,
    /// String set
    Ss(Vec<String>),
    /// Number set
    Ns(Vec<String>),
    /// List
    L(Vec<AttributeValue>),
    /// Nested map
    M(HashMap<String, AttributeValue>),
}

impl AttributeValue {
    /// String accessor; `None` when the value is not an `S`
    pub fn as_s(&self) -> Option<&str> {
        match self {
            AttributeValue::S(s) => Some(s),
            _ => None,
        }
    }

    /// Number accessor (string form); `None` when the value is not an `N`
    pub fn as_n(&self) -> Option<&str> {
        match self {
            AttributeValue::N(n) => Some(n),
            _ => None,
        }
    }

    /// Binary accessor; `None` when the value is not a `B`
    pub fn as_b(&self) -> Option<&[u8]> {
        match self {
            AttributeValue::B(b) => Some(b),
            _ => None,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::S(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::S(s)
    }
}

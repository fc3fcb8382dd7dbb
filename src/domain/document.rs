//! Search result documents.
//!
//! Documents returned by the backend are arbitrary nested key/value data. They
//! are modelled as a recursive [`Value`] with ordered maps so that column order
//! follows the backend's field order, plus accessors for dotted-path lookup and
//! leaf-field enumeration used by the results table.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A JSON-like value with ordered maps.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Value>),
    Map(Vec<(String, Value)>),
}

impl Value {
    /// Looks up a direct child of a map by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Self> {
        match self {
            Self::Map(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Resolves a dotted path.
    ///
    /// At each level an exact key match on the remaining path wins over
    /// descending, so flattened keys such as `"host.name"` are found as well
    /// as nested objects.
    #[must_use]
    pub fn get_path(&self, path: &str) -> Option<&Self> {
        if let Some(v) = self.get(path) {
            return Some(v);
        }
        let mut split_at = path.find('.');
        while let Some(idx) = split_at {
            let (head, rest) = (&path[..idx], &path[idx + 1..]);
            if let Some(child) = self.get(head).and_then(|c| c.get_path(rest)) {
                return Some(child);
            }
            split_at = path[idx + 1..].find('.').map(|n| idx + 1 + n);
        }
        None
    }

    fn collect_leaves(&self, prefix: &str, out: &mut Vec<String>) {
        match self {
            Self::Map(entries) => {
                for (key, value) in entries {
                    let path = if prefix.is_empty() {
                        key.clone()
                    } else {
                        format!("{prefix}.{key}")
                    };
                    value.collect_leaves(&path, out);
                }
            }
            _ if !prefix.is_empty() => {
                if !out.iter().any(|p| p == prefix) {
                    out.push(prefix.to_string());
                }
            }
            _ => {}
        }
    }

    /// Renders the value as a single table cell.
    #[must_use]
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{n:.0}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
            Self::List(_) | Self::Map(_) => {
                write!(f, "{}", serde_json::Value::from(self.clone()))
            }
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => n.as_f64().map_or(Self::Null, Self::Number),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            serde_json::Value::Object(map) => {
                Self::Map(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => serde_json::Number::from_f64(n).map_or(Self::Null, Self::Number),
            Value::String(s) => Self::String(s),
            Value::List(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            Value::Map(entries) => {
                Self::Object(entries.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

/// One search hit.
///
/// Wraps the document source; the root is always a map.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Value);

impl Document {
    /// Creates a document from a JSON object. Non-object input yields an
    /// empty document.
    #[must_use]
    pub fn from_json(value: serde_json::Value) -> Self {
        match Value::from(value) {
            map @ Value::Map(_) => Self(map),
            _ => Self(Value::Map(Vec::new())),
        }
    }

    /// Resolves a dotted field path.
    #[must_use]
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        self.0.get_path(path)
    }

    /// Returns the dotted paths of every leaf field in document order.
    ///
    /// Lists are treated as leaves.
    #[must_use]
    pub fn leaf_fields(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.0.collect_leaves("", &mut out);
        out
    }

    /// Renders one column, empty when the field is absent.
    #[must_use]
    pub fn render_field(&self, path: &str) -> String {
        self.get_path(path).map(Value::render).unwrap_or_default()
    }

    /// The underlying value.
    #[must_use]
    pub const fn as_value(&self) -> &Value {
        &self.0
    }
}

impl From<serde_json::Value> for Document {
    fn from(value: serde_json::Value) -> Self {
        Self::from_json(value)
    }
}

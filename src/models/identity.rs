//! Object identities.
//!
//! An [`Identity`] names one object across the source store, the container
//! and the destination store by its kind and the primary key it had when it
//! was exported.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Primary key value of an exported object.
///
/// Integer and string keys are carried as-is; other key types (UUIDs, for
/// instance) are expected to be stringified by the codec.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryKey {
    /// Integer key.
    Int(i64),
    /// String key.
    Str(String),
}

impl PrimaryKey {
    /// Converts a raw field value into a primary key.
    ///
    /// Returns `None` for values that cannot be used as a key (null, floats,
    /// collections).
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(Self::Int),
            Value::String(s) => Some(Self::Str(s.clone())),
            _ => None,
        }
    }

    /// Converts the key into a raw field value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Int(i) => Value::from(*i),
            Self::Str(s) => Value::from(s.as_str()),
        }
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for PrimaryKey {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for PrimaryKey {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for PrimaryKey {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

/// Identity of an object: its kind and exported primary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identity {
    /// Kind name, e.g. `library:book`.
    pub kind: String,
    /// Primary key in the source store.
    pub pk: PrimaryKey,
}

impl Identity {
    /// Creates a new identity.
    #[must_use]
    pub fn new(kind: impl Into<String>, pk: impl Into<PrimaryKey>) -> Self {
        Self {
            kind: kind.into(),
            pk: pk.into(),
        }
    }

    /// Parses an identity from its raw field representation (`{kind, pk}`).
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        let kind = map.get("kind")?.as_str()?;
        let pk = PrimaryKey::from_value(map.get("pk")?)?;
        Some(Self::new(kind, pk))
    }

    /// Converts the identity into its raw field representation.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "kind": self.kind,
            "pk": self.pk.to_value(),
        })
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.kind, self.pk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_display() {
        assert_eq!(Identity::new("library:book", 4).to_string(), "library:book-4");
        assert_eq!(
            Identity::new("library:tag", "a1b2").to_string(),
            "library:tag-a1b2"
        );
    }

    #[test]
    fn test_identity_value_roundtrip() {
        let id = Identity::new("library:author", 12);
        let value = id.to_value();
        assert_eq!(value["kind"], "library:author");
        assert_eq!(value["pk"], 12);
        assert_eq!(Identity::from_value(&value), Some(id));
    }

    #[test]
    fn test_identity_from_invalid_value() {
        assert!(Identity::from_value(&Value::Null).is_none());
        assert!(Identity::from_value(&serde_json::json!({"kind": "a"})).is_none());
        assert!(Identity::from_value(&serde_json::json!({"kind": "a", "pk": 1.5})).is_none());
        assert!(Identity::from_value(&serde_json::json!([1, 2])).is_none());
    }

    #[test]
    fn test_primary_key_deserializes_untagged() {
        let int: PrimaryKey = serde_json::from_str("7").unwrap();
        assert_eq!(int, PrimaryKey::Int(7));
        let string: PrimaryKey = serde_json::from_str("\"x\"").unwrap();
        assert_eq!(string, PrimaryKey::Str("x".to_string()));
    }
}

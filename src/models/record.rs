//! In-memory representation of exported and imported objects.

use super::{Attachment, Identity, PrimaryKey, Reference};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Raw serialized fields of an object, as stored in a container.
pub type RawFields = BTreeMap<String, Value>;

/// Typed fields of an object, as produced by a codec.
pub type FieldMap = BTreeMap<String, FieldValue>;

/// Handle to a live record in a store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Instance {
    /// Kind name.
    pub kind: String,
    /// Primary key in the store that holds the record.
    pub pk: PrimaryKey,
}

impl Instance {
    /// Creates a new instance handle.
    #[must_use]
    pub fn new(kind: impl Into<String>, pk: impl Into<PrimaryKey>) -> Self {
        Self {
            kind: kind.into(),
            pk: pk.into(),
        }
    }

    /// Returns the identity this instance would be exported under.
    #[must_use]
    pub fn identity(&self) -> Identity {
        Identity::new(self.kind.clone(), self.pk.clone())
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} {}>", self.kind, self.pk)
    }
}

/// A typed field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Plain data.
    Scalar(Value),
    /// Unresolved reference to objects in the container.
    Ref(Reference),
    /// Single-valued relation (`None` is null).
    Instance(Option<Instance>),
    /// Collection relation.
    Instances(Vec<Instance>),
}

impl FieldValue {
    /// Returns the scalar value, if this is a scalar.
    #[must_use]
    pub const fn as_scalar(&self) -> Option<&Value> {
        match self {
            Self::Scalar(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the string content of a string scalar.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        self.as_scalar().and_then(Value::as_str)
    }

    /// Returns the related instance of a resolved single-valued relation.
    #[must_use]
    pub const fn as_instance(&self) -> Option<&Instance> {
        match self {
            Self::Instance(Some(instance)) => Some(instance),
            _ => None,
        }
    }

    /// Returns whether the value is null (scalar null or empty to-one).
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Scalar(Value::Null) | Self::Instance(None))
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        Self::Scalar(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Scalar(Value::from(value))
    }
}

impl From<Instance> for FieldValue {
    fn from(value: Instance) -> Self {
        Self::Instance(Some(value))
    }
}

/// One object moving through export or import.
///
/// The identity and raw fields never change after creation. Typed fields are
/// populated once during deserialization and then rewritten in place as
/// references are resolved.
#[derive(Debug, Clone)]
pub struct Record {
    /// Identity of the object.
    pub id: Identity,
    /// Raw serialized fields.
    pub raw: RawFields,
    /// Typed fields, once deserialized.
    pub fields: Option<FieldMap>,
    /// Outgoing references.
    pub references: Vec<Reference>,
    /// Union of all outgoing reference targets.
    pub referenced_ids: BTreeSet<Identity>,
    /// Binary attachments.
    pub attachments: Vec<Attachment>,
}

impl Record {
    /// Creates a record holding only raw fields.
    #[must_use]
    pub const fn new(id: Identity, raw: RawFields) -> Self {
        Self {
            id,
            raw,
            fields: None,
            references: Vec::new(),
            referenced_ids: BTreeSet::new(),
            attachments: Vec::new(),
        }
    }

    /// Sets the attachments.
    #[must_use]
    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }

    /// Records an outgoing reference.
    pub fn add_reference(&mut self, reference: Reference) {
        self.referenced_ids.extend(reference.ids.iter().cloned());
        self.references.push(reference);
    }

    /// Returns a typed field, if the record has been deserialized and the
    /// field is present.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.as_ref().and_then(|fields| fields.get(name))
    }

    /// Returns a typed string field.
    #[must_use]
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(FieldValue::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_reference_unions_targets() {
        let mut record = Record::new(Identity::new("library:book", 1), RawFields::new());
        let a1 = Identity::new("library:author", 1);
        let a2 = Identity::new("library:author", 2);
        record.add_reference(Reference::to_one("author", a1.clone(), false));
        record.add_reference(Reference::to_one("coauthor", a1.clone(), true));
        record.add_reference(Reference::to_many("editors", vec![a2.clone()]));

        assert_eq!(record.references.len(), 3);
        assert_eq!(
            record.referenced_ids.iter().collect::<Vec<_>>(),
            vec![&a1, &a2]
        );
    }

    #[test]
    fn test_field_access_before_deserialization() {
        let record = Record::new(Identity::new("library:book", 1), RawFields::new());
        assert!(record.field("name").is_none());
        assert!(record.str_field("name").is_none());
    }

    #[test]
    fn test_field_value_null() {
        assert!(FieldValue::Scalar(Value::Null).is_null());
        assert!(FieldValue::Instance(None).is_null());
        assert!(!FieldValue::Instances(Vec::new()).is_null());
        assert!(!FieldValue::from("x").is_null());
    }
}

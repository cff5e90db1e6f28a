//! Kind schemas: field lists, nullability and relation cardinality.

/// Relation cardinality of a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relation {
    /// Plain data field.
    None,
    /// Single-valued relation to `target`.
    ToOne {
        /// Target kind.
        target: String,
    },
    /// Collection relation to `target`, settable through replace/append.
    ToMany {
        /// Target kind.
        target: String,
    },
    /// Reverse side of a `ToOne` relation declared on `target.via`.
    ///
    /// Derived from the other side and never settable.
    ReverseToMany {
        /// Kind declaring the forward relation.
        target: String,
        /// Name of the forward field on `target`.
        via: String,
    },
}

impl Relation {
    /// Returns the related kind, if this is a relation.
    #[must_use]
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::None => None,
            Self::ToOne { target } | Self::ToMany { target } | Self::ReverseToMany { target, .. } => {
                Some(target.as_str())
            },
        }
    }

    /// Returns whether the field holds a collection.
    #[must_use]
    pub const fn is_collection(&self) -> bool {
        matches!(self, Self::ToMany { .. } | Self::ReverseToMany { .. })
    }
}

/// Schema of a single field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSchema {
    /// Field name.
    pub name: String,
    /// Whether the field accepts null.
    pub nullable: bool,
    /// Relation cardinality.
    pub relation: Relation,
}

impl FieldSchema {
    /// Creates a non-nullable data field.
    #[must_use]
    pub fn scalar(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nullable: false,
            relation: Relation::None,
        }
    }

    /// Creates a non-nullable single-valued relation.
    #[must_use]
    pub fn to_one(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nullable: false,
            relation: Relation::ToOne {
                target: target.into(),
            },
        }
    }

    /// Creates a collection relation. Collections are always nullable.
    #[must_use]
    pub fn to_many(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nullable: true,
            relation: Relation::ToMany {
                target: target.into(),
            },
        }
    }

    /// Creates the reverse side of `target.via`.
    #[must_use]
    pub fn reverse(
        name: impl Into<String>,
        target: impl Into<String>,
        via: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            nullable: true,
            relation: Relation::ReverseToMany {
                target: target.into(),
                via: via.into(),
            },
        }
    }

    /// Marks the field as nullable.
    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Returns whether the field can be assigned directly.
    #[must_use]
    pub const fn is_settable(&self) -> bool {
        !matches!(self.relation, Relation::ReverseToMany { .. })
    }
}

/// Schema of a kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindSchema {
    /// Kind name, e.g. `library:book`.
    pub kind: String,
    /// Name of the primary key field.
    pub primary_key: String,
    /// Declared fields, excluding the primary key.
    pub fields: Vec<FieldSchema>,
}

impl KindSchema {
    /// Creates a schema with an `id` primary key and no fields.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            primary_key: "id".to_string(),
            fields: Vec::new(),
        }
    }

    /// Sets the primary key field name.
    #[must_use]
    pub fn with_primary_key(mut self, name: impl Into<String>) -> Self {
        self.primary_key = name.into();
        self
    }

    /// Adds a field.
    #[must_use]
    pub fn with_field(mut self, field: FieldSchema) -> Self {
        self.fields.push(field);
        self
    }

    /// Looks up a field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Looks up a field, failing with [`crate::Error::UnknownField`].
    pub fn require_field(&self, name: &str) -> crate::Result<&FieldSchema> {
        self.field(name).ok_or_else(|| crate::Error::UnknownField {
            kind: self.kind.clone(),
            field: name.to_string(),
        })
    }

    /// Returns the names of reverse-collection fields.
    pub fn reverse_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|f| !f.is_settable())
            .map(|f| f.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> KindSchema {
        KindSchema::new("library:book")
            .with_field(FieldSchema::scalar("name"))
            .with_field(FieldSchema::to_one("author", "library:author"))
            .with_field(FieldSchema::to_many("tags", "library:tag"))
    }

    #[test]
    fn test_field_lookup() {
        let schema = book();
        assert_eq!(schema.field("name").map(|f| &f.relation), Some(&Relation::None));
        assert!(schema.field("missing").is_none());
        assert!(matches!(
            schema.require_field("missing"),
            Err(crate::Error::UnknownField { .. })
        ));
    }

    #[test]
    fn test_reverse_fields_are_not_settable() {
        let schema = KindSchema::new("library:author")
            .with_field(FieldSchema::scalar("name"))
            .with_field(FieldSchema::reverse("books", "library:book", "author"));
        assert_eq!(schema.reverse_fields().collect::<Vec<_>>(), vec!["books"]);
        assert!(schema.field("name").is_some_and(FieldSchema::is_settable));
    }

    #[test]
    fn test_relation_target() {
        let schema = book();
        let author = schema.field("author").map(|f| f.relation.target());
        assert_eq!(author, Some(Some("library:author")));
        assert!(schema.field("tags").is_some_and(|f| f.relation.is_collection()));
    }
}

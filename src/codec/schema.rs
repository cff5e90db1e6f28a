//! Schema-driven codec.

use super::Codec;
use crate::models::{FieldMap, FieldValue, Identity, Instance, RawFields, Reference};
use crate::storage::{FieldSchema, KindSchema, RecordStore, Relation};
use crate::{Error, Result};
use serde_json::Value;

/// Codec deriving its wire shape from a [`KindSchema`].
///
/// Data fields are copied verbatim. Single-valued relations are encoded as
/// `{kind, pk}` mappings (or null), collections as lists of such mappings.
/// Reverse collections are encoded too and decode into weak references.
#[derive(Debug, Clone)]
pub struct SchemaCodec {
    schema: KindSchema,
}

impl SchemaCodec {
    /// Creates a codec for a schema.
    #[must_use]
    pub const fn new(schema: KindSchema) -> Self {
        Self { schema }
    }

    fn reject(&self, cause: impl Into<String>) -> Error {
        Error::Deserialization {
            kind: self.schema.kind.clone(),
            cause: cause.into(),
        }
    }

    fn identity(&self, field: &str, value: &Value) -> Result<Identity> {
        Identity::from_value(value)
            .ok_or_else(|| self.reject(format!("{field}: {value} is not an identity")))
    }

    fn identities(&self, field: &str, value: &Value) -> Result<Vec<Identity>> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::Array(items) => items.iter().map(|v| self.identity(field, v)).collect(),
            other => Err(self.reject(format!("{field}: expected a list, got {other}"))),
        }
    }

    fn reference(&self, field: &FieldSchema, value: &Value) -> Result<Option<Reference>> {
        Ok(match &field.relation {
            Relation::None => None,
            Relation::ToOne { .. } if value.is_null() => None,
            Relation::ToOne { .. } => Some(Reference::to_one(
                field.name.clone(),
                self.identity(&field.name, value)?,
                field.nullable,
            )),
            Relation::ToMany { .. } => Some(Reference::to_many(
                field.name.clone(),
                self.identities(&field.name, value)?,
            )),
            Relation::ReverseToMany { .. } => Some(
                Reference::to_many(field.name.clone(), self.identities(&field.name, value)?)
                    .weak(),
            ),
        })
    }

    fn decode_one(&self, raw: &RawFields) -> Result<FieldMap> {
        let mut fields = FieldMap::new();
        for (name, value) in raw {
            if *name == self.schema.primary_key {
                continue;
            }
            let field = self.schema.require_field(name)?;
            let decoded = match self.reference(field, value)? {
                Some(reference) => FieldValue::Ref(reference),
                None if matches!(field.relation, Relation::ToOne { .. }) => {
                    if !field.nullable {
                        return Err(self.reject(format!("{name} may not be null")));
                    }
                    FieldValue::Instance(None)
                },
                None => FieldValue::Scalar(value.clone()),
            };
            fields.insert(name.clone(), decoded);
        }
        Ok(fields)
    }
}

impl Codec for SchemaCodec {
    fn kind(&self) -> &str {
        &self.schema.kind
    }

    fn primary_key(&self) -> &str {
        &self.schema.primary_key
    }

    fn encode(&self, store: &dyn RecordStore, instance: &Instance) -> Result<RawFields> {
        let mut raw = RawFields::new();
        raw.insert(self.schema.primary_key.clone(), instance.pk.to_value());
        for field in &self.schema.fields {
            let value = match store.get_field(instance, &field.name)? {
                FieldValue::Scalar(value) => value,
                FieldValue::Instance(Some(target)) => target.identity().to_value(),
                FieldValue::Instance(None) => Value::Null,
                FieldValue::Instances(targets) => Value::Array(
                    targets.iter().map(|t| t.identity().to_value()).collect(),
                ),
                FieldValue::Ref(_) => {
                    return Err(Error::InvalidInput(format!(
                        "{instance}.{} holds an unresolved reference",
                        field.name
                    )));
                },
            };
            raw.insert(field.name.clone(), value);
        }
        Ok(raw)
    }

    fn references(&self, raw: &RawFields) -> Result<Vec<Reference>> {
        let mut references = Vec::new();
        for field in &self.schema.fields {
            if let Some(value) = raw.get(&field.name)
                && let Some(reference) = self.reference(field, value)?
            {
                references.push(reference);
            }
        }
        Ok(references)
    }

    fn decode(&self, raw: &[&RawFields]) -> Result<Vec<FieldMap>> {
        raw.iter().map(|fields| self.decode_one(fields)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FieldSchema, MemoryStore};
    use serde_json::json;

    fn book_schema() -> KindSchema {
        KindSchema::new("library:book")
            .with_field(FieldSchema::scalar("name"))
            .with_field(FieldSchema::to_one("author", "library:author"))
            .with_field(FieldSchema::to_one("coauthor", "library:author").nullable())
            .with_field(FieldSchema::to_many("tags", "library:tag"))
    }

    fn raw(value: Value) -> RawFields {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_decode_relations() {
        let codec = SchemaCodec::new(book_schema());
        let input = raw(json!({
            "id": 7,
            "name": "Earthsea",
            "author": {"kind": "library:author", "pk": 1},
            "coauthor": null,
            "tags": [{"kind": "library:tag", "pk": 3}],
        }));
        let decoded = codec.decode(&[&input]).unwrap();
        let fields = &decoded[0];

        assert!(!fields.contains_key("id"));
        assert_eq!(fields["name"], FieldValue::from("Earthsea"));
        assert_eq!(fields["coauthor"], FieldValue::Instance(None));
        assert_eq!(
            fields["author"],
            FieldValue::Ref(Reference::to_one(
                "author",
                Identity::new("library:author", 1),
                false
            ))
        );
        assert_eq!(
            fields["tags"],
            FieldValue::Ref(Reference::to_many(
                "tags",
                vec![Identity::new("library:tag", 3)]
            ))
        );
    }

    #[test]
    fn test_decode_rejects_null_required_relation() {
        let codec = SchemaCodec::new(book_schema());
        let input = raw(json!({"name": "x", "author": null}));
        assert!(matches!(
            codec.decode(&[&input]),
            Err(Error::Deserialization { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_unknown_field() {
        let codec = SchemaCodec::new(book_schema());
        let input = raw(json!({"name": "x", "pages": 300}));
        assert!(matches!(
            codec.decode(&[&input]),
            Err(Error::UnknownField { .. })
        ));
    }

    #[test]
    fn test_reverse_relation_is_weak() {
        let codec = SchemaCodec::new(
            KindSchema::new("library:author")
                .with_field(FieldSchema::reverse("books", "library:book", "author")),
        );
        let input = raw(json!({"books": [{"kind": "library:book", "pk": 1}]}));
        let references = codec.references(&input).unwrap();
        assert_eq!(references.len(), 1);
        assert!(references[0].weak);
    }

    #[test]
    fn test_encode_includes_primary_key_and_relations() {
        let mut store = MemoryStore::new()
            .with_schema(KindSchema::new("library:author").with_field(FieldSchema::scalar("name")))
            .with_schema(KindSchema::new("library:tag").with_field(FieldSchema::scalar("name")))
            .with_schema(book_schema());
        let author = store
            .insert("library:author", [("name", "A".into())])
            .unwrap();
        let book = store
            .insert(
                "library:book",
                [("name", "B".into()), ("author", author.into())],
            )
            .unwrap();

        let codec = SchemaCodec::new(book_schema());
        let encoded = codec.encode(&store, &book).unwrap();
        assert_eq!(
            Value::Object(encoded.into_iter().collect()),
            json!({
                "id": 1,
                "name": "B",
                "author": {"kind": "library:author", "pk": 1},
                "coauthor": null,
                "tags": [],
            })
        );
    }
}

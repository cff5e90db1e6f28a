//! In-memory record store.
//!
//! Provides a fast, non-persistent implementation of [`RecordStore`] for use
//! in tests, benchmarks and tooling that only needs a schema registry.

use crate::models::{FieldMap, FieldValue, Instance, PrimaryKey};
use crate::storage::traits::{RecordStore, SchemaRegistry};
use crate::storage::{FieldSchema, KindSchema, Relation};
use crate::{Error, Result};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// In-memory record store.
///
/// Primary keys are integers allocated per kind and never reused, so records
/// recreated after [`MemoryStore::clear`] get fresh keys. Field assignments
/// made through [`RecordStore::set_field`] stay pending until
/// [`RecordStore::save`]; collection relations are applied immediately.
///
/// # Example
///
/// ```rust
/// use haul::storage::{FieldSchema, KindSchema, MemoryStore};
///
/// let mut store = MemoryStore::new()
///     .with_schema(KindSchema::new("library:tag").with_field(FieldSchema::scalar("name")));
/// store.insert("library:tag", [("name", "rust".into())])?;
/// assert_eq!(store.count("library:tag"), 1);
/// # Ok::<(), haul::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    schemas: BTreeMap<String, KindSchema>,
    tables: BTreeMap<String, BTreeMap<PrimaryKey, FieldMap>>,
    pending: HashMap<Instance, FieldMap>,
    next_pk: BTreeMap<String, i64>,
}

impl MemoryStore {
    /// Creates an empty store with no schemas.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a schema, builder style.
    #[must_use]
    pub fn with_schema(mut self, schema: KindSchema) -> Self {
        self.register(schema);
        self
    }

    /// Registers a schema.
    pub fn register(&mut self, schema: KindSchema) {
        self.tables.entry(schema.kind.clone()).or_default();
        self.schemas.insert(schema.kind.clone(), schema);
    }

    /// Creates a record, applying collection relations in the same call.
    pub fn insert<'a>(
        &mut self,
        kind: &str,
        fields: impl IntoIterator<Item = (&'a str, FieldValue)>,
    ) -> Result<Instance> {
        let schema = self.require_schema(kind)?.clone();
        let mut plain = FieldMap::new();
        let mut collections = Vec::new();
        for (name, value) in fields {
            match (&schema.require_field(name)?.relation, value) {
                (Relation::ToMany { .. }, FieldValue::Instances(targets)) => {
                    collections.push((name, targets));
                },
                (_, value) => {
                    plain.insert(name.to_string(), value);
                },
            }
        }
        let instance = self.create(kind, plain)?;
        for (name, targets) in collections {
            self.replace_related(&instance, name, targets)?;
        }
        Ok(instance)
    }

    /// Returns the number of records of a kind.
    #[must_use]
    pub fn count(&self, kind: &str) -> usize {
        self.tables.get(kind).map_or(0, BTreeMap::len)
    }

    /// Lists the records of a kind in primary key order.
    #[must_use]
    pub fn instances(&self, kind: &str) -> Vec<Instance> {
        self.tables
            .get(kind)
            .map(|rows| rows.keys().map(|pk| Instance::new(kind, pk.clone())).collect())
            .unwrap_or_default()
    }

    /// Deletes a record. Returns whether it existed.
    pub fn delete(&mut self, instance: &Instance) -> bool {
        self.pending.remove(instance);
        self.tables
            .get_mut(&instance.kind)
            .is_some_and(|rows| rows.remove(&instance.pk).is_some())
    }

    /// Removes every record while keeping schemas and key counters.
    pub fn clear(&mut self) {
        self.pending.clear();
        for rows in self.tables.values_mut() {
            rows.clear();
        }
    }

    fn row(&self, instance: &Instance) -> Result<&FieldMap> {
        self.tables
            .get(&instance.kind)
            .and_then(|rows| rows.get(&instance.pk))
            .ok_or_else(|| not_found(instance))
    }

    fn row_mut(&mut self, instance: &Instance) -> Result<&mut FieldMap> {
        self.tables
            .get_mut(&instance.kind)
            .and_then(|rows| rows.get_mut(&instance.pk))
            .ok_or_else(|| not_found(instance))
    }

    fn collection_field(&self, instance: &Instance, field: &str) -> Result<()> {
        let schema = self.require_schema(&instance.kind)?;
        match schema.require_field(field)?.relation {
            Relation::ToMany { .. } => Ok(()),
            _ => Err(Error::InvalidInput(format!(
                "{}.{field} is not a to-many relation",
                instance.kind
            ))),
        }
    }

    fn reverse_members(&self, instance: &Instance, target: &str, via: &str) -> FieldValue {
        let key = FieldValue::Instance(Some(instance.clone()));
        let members = self
            .tables
            .get(target)
            .map(|rows| {
                rows.iter()
                    .filter(|(_, row)| row.get(via) == Some(&key))
                    .map(|(pk, _)| Instance::new(target, pk.clone()))
                    .collect()
            })
            .unwrap_or_default();
        FieldValue::Instances(members)
    }
}

impl SchemaRegistry for MemoryStore {
    fn schema(&self, kind: &str) -> Option<&KindSchema> {
        self.schemas.get(kind)
    }

    fn kinds(&self) -> Vec<String> {
        self.schemas.keys().cloned().collect()
    }
}

impl RecordStore for MemoryStore {
    fn create(&mut self, kind: &str, fields: FieldMap) -> Result<Instance> {
        let schema = self.require_schema(kind)?;
        let mut row: FieldMap = schema
            .fields
            .iter()
            .filter(|f| f.is_settable())
            .map(|f| (f.name.clone(), default_value(f)))
            .collect();
        for (name, value) in fields {
            let field = settable_field(schema, &name)?;
            row.insert(name, normalize(schema, field, value)?);
        }
        for field in schema.fields.iter().filter(|f| f.is_settable()) {
            if !field.nullable
                && matches!(field.relation, Relation::ToOne { .. })
                && row.get(&field.name).is_some_and(FieldValue::is_null)
            {
                return Err(Error::InvalidInput(format!(
                    "{kind}.{} may not be null",
                    field.name
                )));
            }
        }

        let counter = self.next_pk.entry(kind.to_string()).or_insert(0);
        *counter += 1;
        let pk = PrimaryKey::Int(*counter);
        self.tables
            .entry(kind.to_string())
            .or_default()
            .insert(pk.clone(), row);
        Ok(Instance::new(kind, pk))
    }

    fn fetch(&self, kind: &str, pks: &[PrimaryKey]) -> Result<Vec<Instance>> {
        self.require_schema(kind)?;
        let Some(rows) = self.tables.get(kind) else {
            return Ok(Vec::new());
        };
        Ok(pks
            .iter()
            .filter(|pk| rows.contains_key(pk))
            .map(|pk| Instance::new(kind, pk.clone()))
            .collect())
    }

    fn find_first(
        &self,
        kind: &str,
        criteria: &[(String, FieldValue)],
    ) -> Result<Option<Instance>> {
        let schema = self.require_schema(kind)?;
        let mut expected = Vec::with_capacity(criteria.len());
        for (name, value) in criteria {
            let value = if *name == schema.primary_key {
                value.clone()
            } else {
                normalize(schema, schema.require_field(name)?, value.clone())?
            };
            expected.push((name.as_str(), value));
        }

        for instance in self.instances(kind) {
            let mut matched = true;
            for (name, value) in &expected {
                if self.get_field(&instance, name)? != *value {
                    matched = false;
                    break;
                }
            }
            if matched {
                return Ok(Some(instance));
            }
        }
        Ok(None)
    }

    fn get_field(&self, instance: &Instance, field: &str) -> Result<FieldValue> {
        let schema = self.require_schema(&instance.kind)?;
        let row = self.row(instance)?;
        if field == schema.primary_key {
            return Ok(FieldValue::Scalar(instance.pk.to_value()));
        }
        let field_schema = schema.require_field(field)?;
        if let Relation::ReverseToMany { target, via } = &field_schema.relation {
            return Ok(self.reverse_members(instance, target, via));
        }
        let staged = self.pending.get(instance).and_then(|p| p.get(field));
        Ok(staged
            .or_else(|| row.get(field))
            .cloned()
            .unwrap_or_else(|| default_value(field_schema)))
    }

    fn set_field(&mut self, instance: &Instance, field: &str, value: FieldValue) -> Result<()> {
        let schema = self.require_schema(&instance.kind)?;
        let value = normalize(schema, settable_field(schema, field)?, value)?;
        self.row(instance)?;
        self.pending
            .entry(instance.clone())
            .or_default()
            .insert(field.to_string(), value);
        Ok(())
    }

    fn save(&mut self, instance: &Instance) -> Result<()> {
        let staged = self.pending.remove(instance).unwrap_or_default();
        let row = self.row_mut(instance)?;
        row.extend(staged);
        Ok(())
    }

    fn replace_related(
        &mut self,
        instance: &Instance,
        field: &str,
        targets: Vec<Instance>,
    ) -> Result<()> {
        self.collection_field(instance, field)?;
        let row = self.row_mut(instance)?;
        row.insert(field.to_string(), FieldValue::Instances(targets));
        Ok(())
    }

    fn append_related(
        &mut self,
        instance: &Instance,
        field: &str,
        targets: Vec<Instance>,
    ) -> Result<()> {
        self.collection_field(instance, field)?;
        let row = self.row_mut(instance)?;
        let entry = row
            .entry(field.to_string())
            .or_insert_with(|| FieldValue::Instances(Vec::new()));
        if let FieldValue::Instances(existing) = entry {
            for target in targets {
                if !existing.contains(&target) {
                    existing.push(target);
                }
            }
        }
        Ok(())
    }
}

fn not_found(instance: &Instance) -> Error {
    Error::NotFound {
        kind: instance.kind.clone(),
        pk: instance.pk.to_string(),
    }
}

fn settable_field<'s>(schema: &'s KindSchema, name: &str) -> Result<&'s FieldSchema> {
    let field = schema.require_field(name)?;
    if field.is_settable() {
        Ok(field)
    } else {
        Err(Error::FieldNotSettable {
            kind: schema.kind.clone(),
            field: name.to_string(),
        })
    }
}

fn default_value(field: &FieldSchema) -> FieldValue {
    match field.relation {
        Relation::None => FieldValue::Scalar(Value::Null),
        Relation::ToOne { .. } => FieldValue::Instance(None),
        Relation::ToMany { .. } | Relation::ReverseToMany { .. } => {
            FieldValue::Instances(Vec::new())
        },
    }
}

fn normalize(schema: &KindSchema, field: &FieldSchema, value: FieldValue) -> Result<FieldValue> {
    match (&field.relation, value) {
        (Relation::None, value @ FieldValue::Scalar(_))
        | (Relation::ToOne { .. }, value @ FieldValue::Instance(_))
        | (Relation::ToMany { .. }, value @ FieldValue::Instances(_)) => Ok(value),
        (Relation::ToOne { .. }, FieldValue::Scalar(Value::Null)) => Ok(FieldValue::Instance(None)),
        (_, value) => Err(Error::InvalidInput(format!(
            "{}.{} cannot hold {value:?}",
            schema.kind, field.name
        ))),
    }
}

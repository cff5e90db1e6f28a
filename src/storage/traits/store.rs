//! Record store and schema registry traits.

use crate::Result;
use crate::models::{FieldMap, FieldValue, Instance, PrimaryKey};
use crate::storage::KindSchema;

/// Lookup from kind name to schema.
pub trait SchemaRegistry {
    /// Returns the schema of a kind, if the kind is known.
    fn schema(&self, kind: &str) -> Option<&KindSchema>;

    /// Lists all known kinds.
    fn kinds(&self) -> Vec<String>;

    /// Returns the schema of a kind, failing with
    /// [`crate::Error::KindNotRegistered`] if it is unknown.
    fn require_schema(&self, kind: &str) -> Result<&KindSchema> {
        self.schema(kind)
            .ok_or_else(|| crate::Error::KindNotRegistered(kind.to_string()))
    }
}

/// Store holding live records.
///
/// The store is the authoritative source of truth for the records that
/// exports read and imports write. It provides its own consistency
/// guarantees; the engines add no locking on top.
pub trait RecordStore: SchemaRegistry {
    /// Creates one record from the given fields and returns its handle.
    ///
    /// Collection relations are applied separately through
    /// [`RecordStore::replace_related`] and [`RecordStore::append_related`].
    fn create(&mut self, kind: &str, fields: FieldMap) -> Result<Instance>;

    /// Fetches existing records by primary key. Missing keys are skipped.
    fn fetch(&self, kind: &str, pks: &[PrimaryKey]) -> Result<Vec<Instance>>;

    /// Finds the first record whose fields equal all given criteria.
    fn find_first(&self, kind: &str, criteria: &[(String, FieldValue)])
    -> Result<Option<Instance>>;

    /// Reads a field of a record.
    fn get_field(&self, instance: &Instance, field: &str) -> Result<FieldValue>;

    /// Assigns a field of a record. The change is persisted by
    /// [`RecordStore::save`].
    fn set_field(&mut self, instance: &Instance, field: &str, value: FieldValue) -> Result<()>;

    /// Persists pending field assignments of a record.
    fn save(&mut self, instance: &Instance) -> Result<()>;

    /// Replaces all members of a collection relation.
    fn replace_related(
        &mut self,
        instance: &Instance,
        field: &str,
        targets: Vec<Instance>,
    ) -> Result<()>;

    /// Appends members to a collection relation, skipping existing ones.
    fn append_related(
        &mut self,
        instance: &Instance,
        field: &str,
        targets: Vec<Instance>,
    ) -> Result<()>;
}

//! Codecs converting between live records and raw container fields.
//!
//! A [`Codec`] handles one kind. Encoding reads a live record out of a
//! [`RecordStore`]; decoding turns raw container fields into typed fields
//! whose relations are still unresolved [`FieldValue::Ref`] values.
//!
//! [`FieldValue::Ref`]: crate::models::FieldValue::Ref

mod schema;

pub use schema::SchemaCodec;

use crate::Result;
use crate::models::{FieldMap, Instance, RawFields, Reference};
use crate::storage::{RecordStore, SchemaRegistry};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Serializer for one kind.
pub trait Codec: Send + Sync {
    /// Kind handled by this codec.
    fn kind(&self) -> &str;

    /// Name of the primary key field in encoded output.
    fn primary_key(&self) -> &str;

    /// Encodes a live record, including its primary key field.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be read from the store.
    fn encode(&self, store: &dyn RecordStore, instance: &Instance) -> Result<RawFields>;

    /// Extracts the outgoing references of encoded fields.
    ///
    /// # Errors
    ///
    /// Returns an error if a relation value is not a valid identity.
    fn references(&self, raw: &RawFields) -> Result<Vec<Reference>>;

    /// Decodes a batch of raw field maps. Returns one typed map per input,
    /// in input order.
    ///
    /// # Errors
    ///
    /// Returns an error if any input is rejected.
    fn decode(&self, raw: &[&RawFields]) -> Result<Vec<FieldMap>>;
}

/// Codecs keyed by kind.
#[derive(Clone, Default)]
pub struct CodecRegistry {
    codecs: BTreeMap<String, Arc<dyn Codec>>,
}

impl CodecRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a [`SchemaCodec`] for every kind of a schema registry.
    #[must_use]
    pub fn from_registry(registry: &dyn SchemaRegistry) -> Self {
        let mut codecs = Self::new();
        for kind in registry.kinds() {
            if let Some(schema) = registry.schema(&kind) {
                codecs.register(SchemaCodec::new(schema.clone()));
            }
        }
        codecs
    }

    /// Registers a codec, replacing any previous codec for its kind.
    pub fn register(&mut self, codec: impl Codec + 'static) {
        self.codecs.insert(codec.kind().to_string(), Arc::new(codec));
    }

    /// Registers a codec, builder style.
    #[must_use]
    pub fn with_codec(mut self, codec: impl Codec + 'static) -> Self {
        self.register(codec);
        self
    }

    /// Returns the codec of a kind.
    #[must_use]
    pub fn get(&self, kind: &str) -> Option<&dyn Codec> {
        self.codecs.get(kind).map(AsRef::as_ref)
    }

    /// Returns the codec of a kind, failing with
    /// [`crate::Error::KindNotRegistered`].
    ///
    /// # Errors
    ///
    /// Returns an error if no codec handles the kind.
    pub fn require(&self, kind: &str) -> Result<&dyn Codec> {
        self.get(kind)
            .ok_or_else(|| crate::Error::KindNotRegistered(kind.to_string()))
    }

    /// Returns whether a codec handles the kind.
    #[must_use]
    pub fn contains(&self, kind: &str) -> bool {
        self.codecs.contains_key(kind)
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.codecs.keys()).finish()
    }
}

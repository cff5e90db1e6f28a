//! # Haul
//!
//! Moves graphs of related records between a live record store and a
//! portable container file.
//!
//! Haul exports records together with everything they reference, writes them
//! into a YAML document stream (optionally framed in a ZIP archive together
//! with binary attachments), and imports them into another store without
//! requiring source and destination to share primary keys.
//!
//! ## Features
//!
//! - Dependency-ordered import that tolerates reverse (weak) relations
//! - Pluggable relink actions: create, link by fields, link by primary key,
//!   link to a fixed instance, discard, with chained fallbacks
//! - Cascading discard through non-nullable references
//! - Streaming binary attachments
//!
//! ## Example
//!
//! ```rust,ignore
//! use haul::{CodecRegistry, ContainerFormat, DefaultImportPolicy, ExportContainer, ImportContainer};
//!
//! let mut export = ExportContainer::new(CodecRegistry::from_registry(&source));
//! export.export_objects(&source, &books)?;
//! export.write(&mut file, ContainerFormat::CompressedZip, serde_json::Value::Null)?;
//!
//! let session = ImportContainer::new(CodecRegistry::from_registry(&dest)).read(file, &dest)?;
//! let report = session.import_objects(&mut dest, &mut DefaultImportPolicy)?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

pub mod codec;
pub mod config;
pub mod io;
pub mod models;
pub mod observability;
pub mod policy;
pub mod storage;

pub use codec::{Codec, CodecRegistry, SchemaCodec};
pub use config::HaulConfig;
pub use io::{
    ContainerFormat, ExportContainer, ImportContainer, ImportReport, ImportSession,
};
pub use models::{
    Attachment, FieldMap, FieldValue, Identity, Instance, PrimaryKey, RawFields, Record,
    Reference,
};
pub use policy::{
    ActionKind, DefaultExportPolicy, DefaultImportPolicy, ExportPolicy, ImportPolicy,
    ManyToManyMode, Overwrite, RelinkAction, RelinkStrategy,
};
pub use storage::{MemoryStore, RecordStore, SchemaRegistry};

/// Error type for haul operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Malformed container, unsupported version, mixed kinds in one export call |
/// | `OperationFailed` | I/O, YAML or ZIP errors |
/// | `KindNotRegistered` | A kind has no codec or schema and unknown kinds are not ignored |
/// | `DuplicateObject` | Two objects in one container share an identity |
/// | `UnresolvedReference` | A reference points outside the container |
/// | `CycleDetected` | Non-weak references form a cycle |
/// | `UnresolvedRelink` | A relink action missed and has no fallback |
/// | `Consistency` | Internal invariants were violated |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - The container header is missing or has an unsupported version
    /// - A document carries an unknown `_` tag
    /// - Attachments are written to or read from a plain YAML container
    /// - An export call mixes kinds
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - Filesystem or stream I/O errors occur
    /// - YAML (de)serialization fails
    /// - The ZIP archive is corrupt or an entry is missing
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// A kind has no codec or schema.
    #[error("kind not registered: {0}")]
    KindNotRegistered(String),

    /// A field is not declared by the kind's schema.
    #[error("unknown field '{field}' on kind {kind}")]
    UnknownField {
        /// Kind name.
        kind: String,
        /// Field name.
        field: String,
    },

    /// A field cannot be assigned (reverse relations).
    #[error("field '{field}' on kind {kind} is not settable")]
    FieldNotSettable {
        /// Kind name.
        kind: String,
        /// Field name.
        field: String,
    },

    /// Encoded fields of an exported object lack the primary key.
    #[error("encoded {kind} object has no primary key field '{field}'")]
    MissingPrimaryKey {
        /// Kind name.
        kind: String,
        /// Expected primary key field.
        field: String,
    },

    /// Two objects in one container share an identity.
    #[error("duplicate object {0}")]
    DuplicateObject(Identity),

    /// A reference targets an object absent from the container.
    #[error("{source_id}.{field} references {target}, which is not in the container")]
    UnresolvedReference {
        /// Missing target.
        target: Identity,
        /// Referring object.
        source_id: Identity,
        /// Referring field.
        field: String,
    },

    /// The codec rejected raw fields.
    #[error("failed to deserialize {kind} objects: {cause}")]
    Deserialization {
        /// Kind name.
        kind: String,
        /// The underlying cause.
        cause: String,
    },

    /// Non-weak references form a cycle.
    #[error("reference cycle between {}", format_members(.members))]
    CycleDetected {
        /// Members of the cycle, in edge order.
        members: Vec<Identity>,
    },

    /// A relink action left records unresolved and has no fallback.
    #[error("relink action {action} left {count} object(s) unresolved and has no fallback")]
    UnresolvedRelink {
        /// Description of the action.
        action: String,
        /// Number of unresolved records.
        count: usize,
    },

    /// Internal consistency was violated.
    ///
    /// Raised when:
    /// - The ordering graph stalls with nodes remaining
    /// - A reference target is neither materialized nor discarded
    /// - A relink action returns the wrong number of results
    #[error("consistency error: {0}")]
    Consistency(String),

    /// A record does not exist in the store.
    #[error("{kind} record {pk} not found")]
    NotFound {
        /// Kind name.
        kind: String,
        /// Primary key, formatted.
        pk: String,
    },

    /// Behavior not provided by the caller.
    ///
    /// Raised when:
    /// - A container holds attachments and the import policy has no handler
    #[error("not implemented: {0}")]
    NotImplemented(String),
}

/// Result type alias for haul operations.
pub type Result<T> = std::result::Result<T, Error>;

fn format_members(members: &[Identity]) -> String {
    members
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

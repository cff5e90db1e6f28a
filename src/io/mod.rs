//! Container I/O subsystem.
//!
//! Moves records between a [`RecordStore`](crate::storage::RecordStore) and
//! container files.
//!
//! # Architecture
//!
//! - **Formats** frame the YAML document stream, optionally inside a ZIP
//!   archive together with attachments
//! - **Engine** orders, resolves and relinks imported records
//! - **Services** tie formats, codecs, policies and the engine together
//!
//! # Supported Formats
//!
//! | Format | Attachments | Notes |
//! |--------|-------------|-------|
//! | `yaml` | - | Plain document stream |
//! | `zip` | ✓ | Deflate compressed |
//! | `zip-stored` | ✓ | No compression |
//!
//! # Examples
//!
//! ## Copy a library between stores
//!
//! ```rust
//! use haul::storage::{FieldSchema, KindSchema, MemoryStore};
//! use haul::{CodecRegistry, ContainerFormat, DefaultImportPolicy, ExportContainer, ImportContainer};
//! use std::io::Cursor;
//!
//! let schema = KindSchema::new("library:tag").with_field(FieldSchema::scalar("name"));
//! let mut source = MemoryStore::new().with_schema(schema.clone());
//! source.insert("library:tag", [("name", "rust".into())])?;
//!
//! let mut export = ExportContainer::new(CodecRegistry::from_registry(&source));
//! export.export_objects(&source, &source.instances("library:tag"))?;
//! let buffer = export.write(Cursor::new(Vec::new()), ContainerFormat::Yaml, serde_json::Value::Null)?;
//!
//! let mut dest = MemoryStore::new().with_schema(schema);
//! let session = ImportContainer::new(CodecRegistry::from_registry(&dest)).read(buffer, &dest)?;
//! let report = session.import_objects(&mut dest, &mut DefaultImportPolicy)?;
//! assert_eq!(report.imported.len(), 1);
//! # Ok::<(), haul::Error>(())
//! ```

pub mod engine;
pub mod formats;
pub mod services;

pub use engine::ImportReport;
pub use formats::ContainerFormat;
pub use services::{ExportContainer, ImportContainer, ImportSession};

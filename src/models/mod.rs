//! Data models for haul.
//!
//! Identities, references, records and attachments shared by the export and
//! import engines.

mod attachment;
mod identity;
mod record;
mod reference;

pub use attachment::{Attachment, AttachmentSource, ContentProvider};
pub use identity::{Identity, PrimaryKey};
pub use record::{FieldMap, FieldValue, Instance, RawFields, Record};
pub use reference::Reference;

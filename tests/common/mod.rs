//! Shared fixtures: a small library schema and container helpers.
#![allow(dead_code, clippy::expect_used, clippy::unwrap_used)]

use haul::storage::{FieldSchema, KindSchema};
use haul::{
    CodecRegistry, ContainerFormat, ExportContainer, FieldValue, ImportContainer, ImportPolicy,
    ImportReport, Instance, MemoryStore, Record, RecordStore, RelinkAction,
};
use std::io::Cursor;

pub const TAG: &str = "library:tag";
pub const AUTHOR: &str = "library:author";
pub const BOOK: &str = "library:book";

/// Tags; authors with tags and their books; books with an author, an
/// optional coauthor, an optional ISBN and tags.
pub fn library() -> MemoryStore {
    MemoryStore::new()
        .with_schema(KindSchema::new(TAG).with_field(FieldSchema::scalar("name")))
        .with_schema(
            KindSchema::new(AUTHOR)
                .with_field(FieldSchema::scalar("name"))
                .with_field(FieldSchema::to_many("tags", TAG))
                .with_field(FieldSchema::reverse("books", BOOK, "author")),
        )
        .with_schema(
            KindSchema::new(BOOK)
                .with_field(FieldSchema::scalar("name"))
                .with_field(FieldSchema::scalar("isbn").nullable())
                .with_field(FieldSchema::to_one("author", AUTHOR))
                .with_field(FieldSchema::to_one("coauthor", AUTHOR).nullable())
                .with_field(FieldSchema::to_many("tags", TAG)),
        )
}

pub fn author(store: &mut MemoryStore, name: &str) -> Instance {
    store.insert(AUTHOR, [("name", name.into())]).unwrap()
}

pub fn book(store: &mut MemoryStore, name: &str, author: &Instance) -> Instance {
    store
        .insert(BOOK, [("name", name.into()), ("author", author.clone().into())])
        .unwrap()
}

/// Exports every record of each kind, one `export_objects` call per kind.
pub fn export_kinds(store: &MemoryStore, kinds: &[&str], format: ContainerFormat) -> Vec<u8> {
    let mut container = ExportContainer::new(CodecRegistry::from_registry(store));
    for kind in kinds {
        container
            .export_objects(store, &store.instances(kind))
            .unwrap();
    }
    write(&container, format)
}

pub fn write(container: &ExportContainer, format: ContainerFormat) -> Vec<u8> {
    container
        .write(Cursor::new(Vec::new()), format, serde_json::Value::Null)
        .unwrap()
        .into_inner()
}

pub fn import(
    store: &mut MemoryStore,
    bytes: Vec<u8>,
    policy: &mut dyn ImportPolicy,
) -> haul::Result<ImportReport> {
    let codecs = CodecRegistry::from_registry(&*store);
    let session = ImportContainer::new(codecs).read(Cursor::new(bytes), &*store)?;
    session.import_objects(store, policy)
}

pub fn find(store: &MemoryStore, kind: &str, field: &str, value: &str) -> Option<Instance> {
    store
        .find_first(kind, &[(field.to_string(), value.into())])
        .unwrap()
}

pub fn name_of(store: &MemoryStore, instance: &Instance) -> String {
    store
        .get_field(instance, "name")
        .unwrap()
        .as_str()
        .unwrap()
        .to_string()
}

pub fn related(store: &MemoryStore, instance: &Instance, field: &str) -> FieldValue {
    store.get_field(instance, field).unwrap()
}

/// Import policy choosing the relink action with a closure.
pub struct RelinkWith<F>(pub F);

impl<F> ImportPolicy for RelinkWith<F>
where
    F: FnMut(&str, &Record) -> RelinkAction,
{
    fn relink(&mut self, kind: &str, record: &Record) -> RelinkAction {
        (self.0)(kind, record)
    }
}

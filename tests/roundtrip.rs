//! Export/import round trips through every container format.
#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use common::{AUTHOR, BOOK, TAG, author, book, export_kinds, find, import, library, name_of};
use haul::config::HaulConfig;
use haul::storage::{FieldSchema, KindSchema};
use haul::{
    CodecRegistry, ContainerFormat, DefaultImportPolicy, ExportContainer, FieldValue,
    ImportContainer, MemoryStore, RecordStore, SchemaCodec, SchemaRegistry,
};
use std::io::Cursor;
use test_case::test_case;

#[test_case(ContainerFormat::Yaml ; "yaml")]
#[test_case(ContainerFormat::CompressedZip ; "compressed zip")]
#[test_case(ContainerFormat::StoredZip ; "stored zip")]
fn test_simple_roundtrip(format: ContainerFormat) {
    let mut store = library();
    author(&mut store, "1");
    author(&mut store, "2");

    let bytes = export_kinds(&store, &[AUTHOR], format);
    store.clear();
    let report = import(&mut store, bytes, &mut DefaultImportPolicy).unwrap();

    assert_eq!(store.count(AUTHOR), 2);
    assert_eq!(report.imported.len(), 2);
    assert!(report.discarded.is_empty());
    let mut names: Vec<String> = store
        .instances(AUTHOR)
        .iter()
        .map(|a| name_of(&store, a))
        .collect();
    names.sort();
    assert_eq!(names, vec!["1", "2"]);
}

#[test]
fn test_fk() {
    let mut store = library();
    let a1 = author(&mut store, "1");
    author(&mut store, "2");
    book(&mut store, "b1", &a1);

    let bytes = export_kinds(&store, &[AUTHOR, BOOK], ContainerFormat::Yaml);
    store.clear();
    import(&mut store, bytes, &mut DefaultImportPolicy).unwrap();

    assert_eq!(store.count(AUTHOR), 2);
    assert_eq!(store.count(BOOK), 1);
    let imported_book = &store.instances(BOOK)[0];
    let imported_author = find(&store, AUTHOR, "name", "1").unwrap();
    assert_eq!(
        store.get_field(imported_book, "author").unwrap(),
        FieldValue::Instance(Some(imported_author))
    );
}

#[test]
fn test_primary_keys_are_remapped() {
    let mut store = library();
    let a1 = author(&mut store, "1");
    let b1 = book(&mut store, "b1", &a1);

    let bytes = export_kinds(&store, &[BOOK], ContainerFormat::Yaml);
    store.clear();
    let report = import(&mut store, bytes, &mut DefaultImportPolicy).unwrap();

    let new_book = report.instance_for(&b1.identity()).unwrap();
    let new_author = report.instance_for(&a1.identity()).unwrap();
    assert_ne!(new_book.pk, b1.pk);
    assert_eq!(
        store.get_field(new_book, "author").unwrap(),
        FieldValue::Instance(Some(new_author.clone()))
    );
}

#[test]
fn test_collections_and_optional_fields_survive() {
    let mut store = library();
    let rust = store.insert(TAG, [("name", "rust".into())]).unwrap();
    let yaml = store.insert(TAG, [("name", "yaml".into())]).unwrap();
    let a1 = author(&mut store, "1");
    let a2 = author(&mut store, "2");
    store
        .insert(
            BOOK,
            [
                ("name", "b1".into()),
                ("isbn", "978-1".into()),
                ("author", a1.into()),
                ("coauthor", a2.into()),
                ("tags", FieldValue::Instances(vec![rust, yaml])),
            ],
        )
        .unwrap();

    let bytes = export_kinds(&store, &[BOOK], ContainerFormat::CompressedZip);
    store.clear();
    import(&mut store, bytes, &mut DefaultImportPolicy).unwrap();

    assert_eq!(store.count(TAG), 2);
    assert_eq!(store.count(AUTHOR), 2);
    let b1 = find(&store, BOOK, "name", "b1").unwrap();
    assert_eq!(store.get_field(&b1, "isbn").unwrap().as_str(), Some("978-1"));
    assert_eq!(
        store.get_field(&b1, "coauthor").unwrap(),
        FieldValue::Instance(find(&store, AUTHOR, "name", "2"))
    );
    let FieldValue::Instances(tags) = store.get_field(&b1, "tags").unwrap() else {
        panic!("tags is not a collection");
    };
    let mut names: Vec<String> = tags.iter().map(|t| name_of(&store, t)).collect();
    names.sort();
    assert_eq!(names, vec!["rust", "yaml"]);
}

#[test]
fn test_reverse_relation_restored_from_forward_side() {
    let mut store = library();
    let a1 = author(&mut store, "1");
    book(&mut store, "b1", &a1);
    book(&mut store, "b2", &a1);

    let bytes = export_kinds(&store, &[AUTHOR], ContainerFormat::Yaml);
    store.clear();
    import(&mut store, bytes, &mut DefaultImportPolicy).unwrap();

    assert_eq!(store.count(BOOK), 2);
    let a1 = find(&store, AUTHOR, "name", "1").unwrap();
    let FieldValue::Instances(books) = store.get_field(&a1, "books").unwrap() else {
        panic!("books is not a collection");
    };
    assert_eq!(books.len(), 2);
}

#[test]
fn test_exporting_twice_is_idempotent() {
    let mut store = library();
    let a1 = author(&mut store, "1");
    book(&mut store, "b1", &a1);

    let mut container = ExportContainer::new(CodecRegistry::from_registry(&store));
    container
        .export_objects(&store, &store.instances(BOOK))
        .unwrap();
    let after_first = container.len();
    container
        .export_objects(&store, &store.instances(AUTHOR))
        .unwrap();
    container
        .export_objects(&store, &store.instances(BOOK))
        .unwrap();
    assert_eq!(container.len(), after_first);
    assert_eq!(after_first, 2);
}

#[test]
fn test_metadata_and_dump() {
    let mut store = library();
    let a1 = author(&mut store, "Ursula");
    book(&mut store, "Earthsea", &a1);

    let mut container = ExportContainer::new(CodecRegistry::from_registry(&store));
    container
        .export_objects(&store, &store.instances(BOOK))
        .unwrap();
    let bytes = container
        .write(
            Cursor::new(Vec::new()),
            ContainerFormat::Yaml,
            serde_json::json!({"source": "test"}),
        )
        .unwrap()
        .into_inner();

    let session = ImportContainer::new(CodecRegistry::from_registry(&store))
        .read(Cursor::new(bytes), &store)
        .unwrap();
    assert_eq!(session.metadata()["source"], "test");
    assert_eq!(
        session.object_kinds(),
        &[AUTHOR.to_string(), BOOK.to_string()]
    );
    assert!(!session.is_archive());

    let mut listing = Vec::new();
    session.dump_objects(&mut listing).unwrap();
    let listing = String::from_utf8(listing).unwrap();
    assert!(listing.contains("* library:book-1"));
    assert!(listing.contains("  - name = \"Earthsea\""));
    assert!(listing.contains("Fields:"));
}

#[test]
fn test_container_on_disk() {
    let mut store = library();
    let a1 = author(&mut store, "1");
    book(&mut store, "b1", &a1);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("library.haul");
    let format = ContainerFormat::from_path(&path).unwrap();
    assert_eq!(format, ContainerFormat::CompressedZip);

    let mut container = ExportContainer::new(CodecRegistry::from_registry(&store));
    container
        .export_objects(&store, &store.instances(BOOK))
        .unwrap();
    let file = std::fs::File::create(&path).unwrap();
    container
        .write(file, format, serde_json::Value::Null)
        .unwrap();

    store.clear();
    let file = std::fs::File::open(&path).unwrap();
    let session = ImportContainer::new(CodecRegistry::from_registry(&store))
        .read(file, &store)
        .unwrap();
    assert!(session.is_archive());
    session
        .import_objects(&mut store, &mut DefaultImportPolicy)
        .unwrap();
    assert_eq!(store.count(BOOK), 1);
    assert_eq!(store.count(AUTHOR), 1);
}

#[test]
fn test_optional_references_to_unregistered_kinds_are_dropped() {
    let mut store = library();
    let rust = store.insert(TAG, [("name", "rust".into())]).unwrap();
    store
        .insert(
            AUTHOR,
            [
                ("name", "1".into()),
                ("tags", FieldValue::Instances(vec![rust])),
            ],
        )
        .unwrap();
    let codecs = CodecRegistry::new()
        .with_codec(SchemaCodec::new(store.schema(AUTHOR).unwrap().clone()))
        .with_codec(SchemaCodec::new(store.schema(BOOK).unwrap().clone()));

    let mut strict = ExportContainer::new(codecs.clone());
    assert!(
        strict
            .export_objects(&store, &store.instances(AUTHOR))
            .is_err()
    );

    let config = HaulConfig::new().with_ignore_unknown(true);
    let mut container = ExportContainer::new(codecs).with_config(&config);
    container
        .export_objects(&store, &store.instances(AUTHOR))
        .unwrap();
    assert_eq!(container.len(), 1);
    let record = container.records().next().unwrap();
    assert_eq!(record.raw["tags"], serde_json::json!([]));
    assert!(record.referenced_ids.is_empty());
}

#[test]
fn test_long_self_referencing_chain() {
    const NODE: &str = "list:node";
    const LENGTH: usize = 10_000;
    let schema = KindSchema::new(NODE)
        .with_field(FieldSchema::scalar("name"))
        .with_field(FieldSchema::to_one("next", NODE).nullable());
    let mut store = MemoryStore::new().with_schema(schema);
    let mut last = store.insert(NODE, [("name", "0".into())]).unwrap();
    for i in 1..LENGTH {
        last = store
            .insert(
                NODE,
                [
                    ("name", i.to_string().as_str().into()),
                    ("next", last.into()),
                ],
            )
            .unwrap();
    }

    let mut container = ExportContainer::new(CodecRegistry::from_registry(&store));
    container.export_objects(&store, &[last]).unwrap();
    assert_eq!(container.len(), LENGTH);
    let bytes = common::write(&container, ContainerFormat::Yaml);

    store.clear();
    let report = import(&mut store, bytes, &mut DefaultImportPolicy).unwrap();
    assert_eq!(report.imported.len(), LENGTH);
    assert_eq!(store.count(NODE), LENGTH);
    let head = find(&store, NODE, "name", "1").unwrap();
    let next = store.get_field(&head, "next").unwrap();
    assert_eq!(name_of(&store, next.as_instance().unwrap()), "0");
}

#[test_case("library.yaml", ContainerFormat::Yaml ; "extension wins")]
#[test_case("library", ContainerFormat::StoredZip ; "configured format without extension")]
#[test_case("library.bin", ContainerFormat::StoredZip ; "configured format for unknown extension")]
fn test_save_picks_format(file_name: &str, expected: ContainerFormat) {
    let mut store = library();
    let a1 = author(&mut store, "1");
    book(&mut store, "b1", &a1);

    let config = HaulConfig::from_toml("format = \"zip-stored\"").unwrap();
    let mut container = ExportContainer::new(CodecRegistry::from_registry(&store)).with_config(&config);
    container
        .export_objects(&store, &store.instances(BOOK))
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(file_name);
    let format = container.save(&path, serde_json::Value::Null).unwrap();
    assert_eq!(format, expected);

    store.clear();
    let session = ImportContainer::new(CodecRegistry::from_registry(&store))
        .read(std::fs::File::open(&path).unwrap(), &store)
        .unwrap();
    assert_eq!(session.is_archive(), expected.is_archive());
    session
        .import_objects(&mut store, &mut DefaultImportPolicy)
        .unwrap();
    assert_eq!(store.count(BOOK), 1);
}

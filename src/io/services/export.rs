//! Export container.
//!
//! Collects records and everything they reference, then writes them as a
//! container.

use crate::codec::CodecRegistry;
use crate::config::HaulConfig;
use crate::io::formats::archive::ArchiveWriter;
use crate::io::formats::yaml::DocumentWriter;
use crate::io::formats::{
    AttachmentEntry, ContainerFormat, Document, FORMAT_VERSION, METADATA_ENTRY, attachment_entry,
};
use crate::models::{Identity, Instance, PrimaryKey, RawFields, Record};
use crate::policy::{DefaultExportPolicy, ExportPolicy};
use crate::storage::RecordStore;
use crate::{Error, Result};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;
use tracing::{debug, instrument};

/// Collects exported records and writes them into a container.
///
/// # Example
///
/// ```rust,ignore
/// use haul::{CodecRegistry, ContainerFormat, ExportContainer};
///
/// let mut container = ExportContainer::new(CodecRegistry::from_registry(&store));
/// container.export_objects(&store, &store.instances("library:book"))?;
/// let file = std::fs::File::create("library.haul")?;
/// container.write(file, ContainerFormat::CompressedZip, serde_json::Value::Null)?;
/// ```
pub struct ExportContainer {
    codecs: CodecRegistry,
    policy: Box<dyn ExportPolicy>,
    ignore_unknown: bool,
    format: ContainerFormat,
    records: Vec<Record>,
    exported: HashSet<Identity>,
}

impl ExportContainer {
    /// Creates an empty container using the default export policy.
    #[must_use]
    pub fn new(codecs: CodecRegistry) -> Self {
        Self {
            codecs,
            policy: Box::new(DefaultExportPolicy),
            ignore_unknown: false,
            format: ContainerFormat::Yaml,
            records: Vec::new(),
            exported: HashSet::new(),
        }
    }

    /// Sets the export policy.
    #[must_use]
    pub fn with_policy(mut self, policy: impl ExportPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    /// Skips optional references to kinds without a codec.
    #[must_use]
    pub const fn with_ignore_unknown(mut self, ignore_unknown: bool) -> Self {
        self.ignore_unknown = ignore_unknown;
        self
    }

    /// Sets the format [`ExportContainer::save`] falls back to when the
    /// path has no recognized extension.
    #[must_use]
    pub const fn with_format(mut self, format: ContainerFormat) -> Self {
        self.format = format;
        self
    }

    /// Applies the `ignore_unknown` and `format` settings of `config`.
    #[must_use]
    pub const fn with_config(self, config: &HaulConfig) -> Self {
        self.with_ignore_unknown(config.ignore_unknown)
            .with_format(config.format)
    }

    /// Exports records of one kind and everything they reference, directly
    /// or transitively. Records exported before are skipped.
    ///
    /// Referenced records are fetched one batch per kind and drained from a
    /// worklist, so long reference chains do not grow the stack.
    ///
    /// # Errors
    ///
    /// Returns an error if the records mix kinds, a kind has no codec, an
    /// encoded record lacks its primary key, a required reference target is
    /// refused by the policy, or the store fails.
    #[instrument(skip_all, fields(count = instances.len()))]
    pub fn export_objects(&mut self, store: &dyn RecordStore, instances: &[Instance]) -> Result<()> {
        let Some(first) = instances.first() else {
            return Ok(());
        };
        let kind = first.kind.clone();
        if instances.iter().any(|instance| instance.kind != kind) {
            return Err(Error::InvalidInput(
                "objects exported together must be of the same kind".to_string(),
            ));
        }

        let roots: Vec<Instance> = instances
            .iter()
            .filter(|instance| !self.exported.contains(&instance.identity()))
            .filter(|instance| self.policy.should_export_object(store, instance))
            .cloned()
            .collect();
        if roots.is_empty() {
            return Ok(());
        }

        let mut queued: HashSet<Identity> = roots.iter().map(Instance::identity).collect();
        let mut worklist = VecDeque::from([(kind, roots)]);
        while let Some((kind, batch)) = worklist.pop_front() {
            let next = self.export_batch(store, &kind, &batch, &mut queued)?;
            worklist.extend(next);
        }
        Ok(())
    }

    /// Encodes one batch of accepted instances and returns the referenced
    /// instances still to export, grouped by kind.
    fn export_batch(
        &mut self,
        store: &dyn RecordStore,
        kind: &str,
        batch: &[Instance],
        queued: &mut HashSet<Identity>,
    ) -> Result<Vec<(String, Vec<Instance>)>> {
        let codec = self.codecs.require(kind)?;
        debug!(kind, count = batch.len(), "exporting objects");

        let mut encoded = Vec::with_capacity(batch.len());
        for instance in batch {
            let mut raw = codec.encode(store, instance)?;
            let pk_value = raw
                .remove(codec.primary_key())
                .ok_or_else(|| Error::MissingPrimaryKey {
                    kind: kind.to_string(),
                    field: codec.primary_key().to_string(),
                })?;
            let pk = PrimaryKey::from_value(&pk_value).ok_or_else(|| {
                Error::InvalidInput(format!(
                    "{kind} primary key {pk_value} is neither an integer nor a string"
                ))
            })?;
            let id = Identity::new(kind, pk);
            if !self.exported.insert(id.clone()) {
                continue;
            }
            let references = codec.references(&raw)?;
            encoded.push((instance, id, raw, references));
        }

        let mut wanted: BTreeMap<String, BTreeSet<PrimaryKey>> = BTreeMap::new();
        for (instance, _, raw, references) in &mut encoded {
            for reference in references.iter_mut() {
                let mut dropped = HashSet::new();
                for target in std::mem::take(&mut reference.ids) {
                    if self.exported.contains(&target) || queued.contains(&target) {
                        reference.ids.push(target);
                    } else if self.skips(*instance, &target, &reference.field, reference.nullable) {
                        dropped.insert(target);
                    } else {
                        wanted
                            .entry(target.kind.clone())
                            .or_default()
                            .insert(target.pk.clone());
                        reference.ids.push(target);
                    }
                }
                if !dropped.is_empty() {
                    drop_targets(raw, &reference.field, &dropped);
                }
            }
        }

        let mut refused = HashSet::new();
        let mut next = Vec::new();
        for (target_kind, pks) in wanted {
            let pks: Vec<PrimaryKey> = pks.into_iter().collect();
            let mut accepted = Vec::new();
            for target in store.fetch(&target_kind, &pks)? {
                if self.policy.should_export_object(store, &target) {
                    queued.insert(target.identity());
                    accepted.push(target);
                } else {
                    refused.insert(target.identity());
                }
            }
            if !accepted.is_empty() {
                next.push((target_kind, accepted));
            }
        }

        for (instance, id, mut raw, references) in encoded {
            let mut record_references = Vec::new();
            for mut reference in references {
                let dropped: HashSet<Identity> = reference
                    .ids
                    .iter()
                    .filter(|target| refused.contains(*target))
                    .cloned()
                    .collect();
                if let Some(target) = dropped.iter().next() {
                    if !reference.nullable {
                        return Err(Error::InvalidInput(format!(
                            "{instance}.{} requires {target}, which the export policy refuses",
                            reference.field
                        )));
                    }
                    debug!(object = %id, field = %reference.field, "dropping references to refused objects");
                    reference.ids.retain(|target| !dropped.contains(target));
                    drop_targets(&mut raw, &reference.field, &dropped);
                }
                if !reference.ids.is_empty() {
                    record_references.push(reference);
                }
            }

            let attachments = self.policy.get_attachments(store, instance)?;
            let mut record = Record::new(id, raw).with_attachments(attachments);
            for reference in record_references {
                record.add_reference(reference);
            }
            self.records.push(record);
        }
        Ok(next)
    }

    /// Returns whether an optional reference target is left out without
    /// consulting the store.
    fn skips(&self, instance: &Instance, target: &Identity, field: &str, nullable: bool) -> bool {
        if !nullable {
            return false;
        }
        if !self.codecs.contains(&target.kind) {
            if self.ignore_unknown {
                debug!(object = %target, "ignoring object of unregistered kind");
            }
            return self.ignore_unknown;
        }
        !self.policy.should_follow_reference(instance, target, field)
    }

    /// Iterates the collected records in export order.
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }

    /// Returns the number of collected records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns whether no record has been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Writes the container and returns the writer.
    ///
    /// `metadata` is stored verbatim in the header and exposed on import.
    ///
    /// # Errors
    ///
    /// Returns an error if a record carries attachments and `format` is
    /// plain YAML, an attachment cannot be opened, or writing fails.
    #[instrument(skip_all, fields(format = %format, objects = self.records.len()))]
    pub fn write<W: Write + Seek>(
        &self,
        writer: W,
        format: ContainerFormat,
        metadata: Value,
    ) -> Result<W> {
        let object_kinds: BTreeSet<&str> =
            self.records.iter().map(|r| r.id.kind.as_str()).collect();
        let header = Document::Header {
            version: FORMAT_VERSION,
            object_kinds: object_kinds.into_iter().map(str::to_string).collect(),
            metadata,
        };

        if !format.is_archive() {
            if let Some(record) = self.records.iter().find(|r| !r.attachments.is_empty()) {
                return Err(Error::InvalidInput(format!(
                    "{} has attachments, which require a ZIP based container format",
                    record.id
                )));
            }
            let mut documents = DocumentWriter::new(writer);
            self.write_documents(&mut documents, &header)?;
            return documents.finish();
        }

        let mut archive = ArchiveWriter::new(writer, format)?;
        {
            let mut documents = DocumentWriter::new(archive.start_entry(METADATA_ENTRY)?);
            self.write_documents(&mut documents, &header)?;
            documents.finish()?;
        }
        for record in &self.records {
            for attachment in &record.attachments {
                let mut content = attachment.open()?;
                let size = archive.copy_entry(&attachment_entry(&attachment.id), &mut *content)?;
                debug!(object = %record.id, attachment = %attachment.id, size, "wrote attachment");
            }
        }
        archive.finish()
    }

    /// Writes the container to a file and returns the format used: the one
    /// named by the file extension, else the configured format.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or
    /// [`ExportContainer::write`] fails.
    pub fn save(&self, path: &Path, metadata: Value) -> Result<ContainerFormat> {
        let format = ContainerFormat::from_path(path).unwrap_or(self.format);
        let file = File::create(path).map_err(|e| Error::OperationFailed {
            operation: "create_container".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;
        let mut writer = self.write(BufWriter::new(file), format, metadata)?;
        writer.flush().map_err(|e| Error::OperationFailed {
            operation: "write_container".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;
        debug!(path = %path.display(), %format, "saved container");
        Ok(format)
    }

    fn write_documents<W: Write>(
        &self,
        documents: &mut DocumentWriter<W>,
        header: &Document,
    ) -> Result<()> {
        documents.write(header)?;
        for record in &self.records {
            documents.write(&Document::Object {
                id: record.id.clone(),
                data: record.raw.clone(),
                attachments: record
                    .attachments
                    .iter()
                    .map(|a| AttachmentEntry {
                        id: a.id.clone(),
                        key: a.key.clone(),
                    })
                    .collect(),
            })?;
        }
        Ok(())
    }
}

/// Removes dropped targets from an encoded relation field.
fn drop_targets(raw: &mut RawFields, field: &str, dropped: &HashSet<Identity>) {
    let Some(value) = raw.get_mut(field) else {
        return;
    };
    match value {
        Value::Array(items) => {
            items.retain(|item| Identity::from_value(item).is_none_or(|id| !dropped.contains(&id)));
        },
        other => *other = Value::Null,
    }
}

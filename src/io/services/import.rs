//! Import container.
//!
//! Reads a container into an [`ImportSession`], which imports its records
//! once and delivers their attachments.

use crate::codec::CodecRegistry;
use crate::config::HaulConfig;
use crate::io::engine::{ImportEngine, ImportReport};
use crate::io::formats::archive::{ArchiveReader, is_archive};
use crate::io::formats::yaml::read_documents;
use crate::io::formats::{Document, FORMAT_VERSION, METADATA_ENTRY, attachment_entry};
use crate::models::{Attachment, Record};
use crate::policy::ImportPolicy;
use crate::storage::{RecordStore, SchemaRegistry};
use crate::{Error, Result};
use serde_json::Value;
use std::collections::{BTreeSet, HashSet};
use std::io::{Read, Seek, Write};
use tracing::{debug, instrument};

/// Reads containers.
#[derive(Debug, Clone, Default)]
pub struct ImportContainer {
    codecs: CodecRegistry,
    ignore_unknown: bool,
}

impl ImportContainer {
    /// Creates a container reader using `codecs` to decode objects.
    #[must_use]
    pub const fn new(codecs: CodecRegistry) -> Self {
        Self {
            codecs,
            ignore_unknown: false,
        }
    }

    /// Tolerates kinds unknown to the destination; their objects are
    /// discarded on import.
    #[must_use]
    pub const fn with_ignore_unknown(mut self, ignore_unknown: bool) -> Self {
        self.ignore_unknown = ignore_unknown;
        self
    }

    /// Applies the `ignore_unknown` setting of `config`.
    #[must_use]
    pub const fn with_config(self, config: &HaulConfig) -> Self {
        self.with_ignore_unknown(config.ignore_unknown)
    }

    /// Opens a container and loads its objects.
    ///
    /// The stream is rewound first. ZIP archives are detected by their magic
    /// bytes; anything else is read as a plain YAML document stream. Header
    /// kinds are checked against `registry`.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream cannot be read or parsed, the header
    /// is missing or has an unsupported version, the header lists unknown
    /// kinds and unknown kinds are not ignored, two objects share an
    /// identity, attachment ids repeat, or a plain container lists
    /// attachments.
    #[instrument(skip_all)]
    pub fn read<R: Read + Seek>(
        &self,
        mut reader: R,
        registry: &dyn SchemaRegistry,
    ) -> Result<ImportSession<R>> {
        let (content, archive) = if is_archive(&mut reader)? {
            debug!("detected a ZIP container");
            let mut archive = ArchiveReader::new(reader)?;
            (archive.read_to_string(METADATA_ENTRY)?, Some(archive))
        } else {
            let mut content = String::new();
            reader
                .read_to_string(&mut content)
                .map_err(|e| Error::OperationFailed {
                    operation: "read_container".to_string(),
                    cause: e.to_string(),
                })?;
            (content, None)
        };

        let mut header = None;
        let mut records = Vec::new();
        let mut ids = HashSet::new();
        let mut attachment_ids = HashSet::new();
        for document in read_documents(&content)? {
            match document {
                Document::Header {
                    version,
                    object_kinds,
                    metadata,
                } => {
                    if header.is_some() {
                        return Err(Error::InvalidInput(
                            "container has more than one header".to_string(),
                        ));
                    }
                    if version != FORMAT_VERSION {
                        return Err(Error::InvalidInput(format!(
                            "unsupported container version {version}"
                        )));
                    }
                    let unknown: BTreeSet<&str> = object_kinds
                        .iter()
                        .map(String::as_str)
                        .filter(|kind| registry.schema(kind).is_none())
                        .collect();
                    if !unknown.is_empty() && !self.ignore_unknown {
                        return Err(Error::KindNotRegistered(
                            unknown.into_iter().collect::<Vec<_>>().join(", "),
                        ));
                    }
                    if !metadata.is_null() {
                        debug!(%metadata, "container metadata");
                    }
                    header = Some((object_kinds, metadata));
                },
                Document::Object {
                    id,
                    data,
                    attachments,
                } => {
                    debug!(object = %id, "extracting object");
                    if !ids.insert(id.clone()) {
                        return Err(Error::DuplicateObject(id));
                    }
                    if !attachments.is_empty() && archive.is_none() {
                        return Err(Error::InvalidInput(format!(
                            "{id} lists attachments but the container is not a ZIP archive"
                        )));
                    }
                    let mut loaded = Vec::with_capacity(attachments.len());
                    for entry in attachments {
                        if !attachment_ids.insert(entry.id.clone()) {
                            return Err(Error::InvalidInput(format!(
                                "duplicate attachment id {}",
                                entry.id
                            )));
                        }
                        loaded.push(Attachment::in_container(entry.id, entry.key));
                    }
                    records.push(Record::new(id, data).with_attachments(loaded));
                },
            }
        }

        let Some((object_kinds, metadata)) = header else {
            return Err(Error::InvalidInput("container has no header".to_string()));
        };
        debug!(objects = records.len(), "container loaded");
        Ok(ImportSession {
            codecs: self.codecs.clone(),
            ignore_unknown: self.ignore_unknown,
            object_kinds,
            metadata,
            records,
            archive,
        })
    }
}

/// An opened container bound to one import.
///
/// Owns the archive handle, which is released when the session is dropped.
pub struct ImportSession<R: Read + Seek> {
    codecs: CodecRegistry,
    ignore_unknown: bool,
    object_kinds: Vec<String>,
    metadata: Value,
    records: Vec<Record>,
    archive: Option<ArchiveReader<R>>,
}

impl<R: Read + Seek> ImportSession<R> {
    /// Returns the caller metadata stored in the header.
    #[must_use]
    pub const fn metadata(&self) -> &Value {
        &self.metadata
    }

    /// Returns the kinds listed in the header.
    #[must_use]
    pub fn object_kinds(&self) -> &[String] {
        &self.object_kinds
    }

    /// Returns the loaded records in container order.
    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Returns whether the container is a ZIP archive.
    #[must_use]
    pub const fn is_archive(&self) -> bool {
        self.archive.is_some()
    }

    /// Writes a human-readable listing of every loaded object.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn dump_objects<W: Write>(&self, mut writer: W) -> Result<()> {
        let failed = |e: std::io::Error| Error::OperationFailed {
            operation: "dump_objects".to_string(),
            cause: e.to_string(),
        };
        for record in &self.records {
            writeln!(writer, "* {}", record.id).map_err(failed)?;
            writeln!(writer, "\n  Fields:").map_err(failed)?;
            for (name, value) in &record.raw {
                writeln!(writer, "  - {name} = {value}").map_err(failed)?;
            }
            if !record.attachments.is_empty() {
                writeln!(writer, "\n  Attachments:").map_err(failed)?;
                for attachment in &record.attachments {
                    writeln!(writer, "  - {}: {}", attachment.id, attachment.key)
                        .map_err(failed)?;
                }
            }
            writeln!(writer).map_err(failed)?;
        }
        Ok(())
    }

    /// Imports the loaded records into `store`, then hands the attachments
    /// of every materialized record to the policy.
    ///
    /// Consumes the session: the archive is closed on return, whether the
    /// import succeeded or not.
    ///
    /// # Errors
    ///
    /// Returns any error of the import engine, or of attachment delivery.
    #[instrument(skip_all, fields(objects = self.records.len()))]
    pub fn import_objects(
        self,
        store: &mut dyn RecordStore,
        policy: &mut dyn ImportPolicy,
    ) -> Result<ImportReport> {
        let Self {
            codecs,
            ignore_unknown,
            records,
            mut archive,
            ..
        } = self;

        let report = ImportEngine::new(&codecs, store, &mut *policy)
            .with_ignore_unknown(ignore_unknown)
            .run(records)?;

        for record in &report.loaded {
            let Some(instance) = report.instance_for(&record.id) else {
                continue;
            };
            for attachment in &record.attachments {
                let Some(archive) = archive.as_mut() else {
                    return Err(Error::Consistency(format!(
                        "attachment {} has no archive to read from",
                        attachment.id
                    )));
                };
                archive.with_entry(&attachment_entry(&attachment.id), |stream| {
                    policy.process_attachment(instance, &attachment.key, stream)
                })?;
                debug!(object = %record.id, attachment = %attachment.id, "delivered attachment");
            }
        }
        Ok(report)
    }
}

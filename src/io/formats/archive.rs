//! ZIP archive framing.

use super::ContainerFormat;
use crate::{Error, Result};
use std::io::{Read, Seek, SeekFrom, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Magic prefix of ZIP files.
pub const ZIP_MAGIC: &[u8; 2] = b"PK";

fn zip_failed(operation: &str, e: impl std::fmt::Display) -> Error {
    Error::OperationFailed {
        operation: operation.to_string(),
        cause: e.to_string(),
    }
}

/// Returns whether a stream holds a ZIP archive.
///
/// Peeks at the first two bytes; the stream is rewound to its start either
/// way.
///
/// # Errors
///
/// Returns an error if the stream cannot be read or rewound.
pub fn is_archive<R: Read + Seek>(reader: &mut R) -> Result<bool> {
    reader
        .seek(SeekFrom::Start(0))
        .map_err(|e| zip_failed("detect_container", e))?;
    let mut magic = [0_u8; 2];
    let mut filled = 0;
    while filled < magic.len() {
        let read = reader
            .read(&mut magic[filled..])
            .map_err(|e| zip_failed("detect_container", e))?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    reader
        .seek(SeekFrom::Start(0))
        .map_err(|e| zip_failed("detect_container", e))?;
    Ok(filled == magic.len() && &magic == ZIP_MAGIC)
}

/// Writes named entries into a ZIP archive.
pub struct ArchiveWriter<W: Write + Seek> {
    zip: ZipWriter<W>,
    options: SimpleFileOptions,
}

impl<W: Write + Seek> ArchiveWriter<W> {
    /// Creates an archive writer for an archive format.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for non-archive formats.
    pub fn new(writer: W, format: ContainerFormat) -> Result<Self> {
        let method = match format {
            ContainerFormat::CompressedZip => CompressionMethod::Deflated,
            ContainerFormat::StoredZip => CompressionMethod::Stored,
            ContainerFormat::Yaml => {
                return Err(Error::InvalidInput(format!(
                    "{format} containers are not archives"
                )));
            },
        };
        Ok(Self {
            zip: ZipWriter::new(writer),
            options: SimpleFileOptions::default().compression_method(method),
        })
    }

    /// Starts a new entry and returns a writer for its content.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be started.
    pub fn start_entry(&mut self, name: &str) -> Result<&mut ZipWriter<W>> {
        self.zip
            .start_file(name, self.options)
            .map_err(|e| zip_failed("write_archive", e))?;
        Ok(&mut self.zip)
    }

    /// Streams a reader into a new entry.
    ///
    /// # Errors
    ///
    /// Returns an error if reading or writing fails.
    pub fn copy_entry(&mut self, name: &str, content: &mut dyn Read) -> Result<u64> {
        let entry = self.start_entry(name)?;
        std::io::copy(content, entry).map_err(|e| zip_failed("write_attachment", e))
    }

    /// Writes the central directory and returns the underlying writer.
    ///
    /// # Errors
    ///
    /// Returns an error if finishing the archive fails.
    pub fn finish(self) -> Result<W> {
        self.zip.finish().map_err(|e| zip_failed("finish_archive", e))
    }
}

/// Reads named entries from a ZIP archive.
pub struct ArchiveReader<R: Read + Seek> {
    zip: ZipArchive<R>,
}

impl<R: Read + Seek> ArchiveReader<R> {
    /// Opens an archive.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive is corrupt.
    pub fn new(reader: R) -> Result<Self> {
        let zip = ZipArchive::new(reader).map_err(|e| zip_failed("open_archive", e))?;
        Ok(Self { zip })
    }

    /// Reads a UTF-8 entry into a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry is missing or not UTF-8.
    pub fn read_to_string(&mut self, name: &str) -> Result<String> {
        self.with_entry(name, |entry| {
            let mut content = String::new();
            entry
                .read_to_string(&mut content)
                .map_err(|e| zip_failed("read_archive", e))?;
            Ok(content)
        })
    }

    /// Opens an entry and hands its content stream to `f`.
    ///
    /// The stream is closed when `f` returns.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry is missing, or whatever `f` returns.
    pub fn with_entry<T>(
        &mut self,
        name: &str,
        f: impl FnOnce(&mut dyn Read) -> Result<T>,
    ) -> Result<T> {
        let mut entry = self
            .zip
            .by_name(name)
            .map_err(|e| zip_failed("read_archive", format!("{name}: {e}")))?;
        f(&mut entry)
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.zip.len()
    }

    /// Returns whether the archive has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.zip.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn build(format: ContainerFormat) -> Vec<u8> {
        let mut archive = ArchiveWriter::new(Cursor::new(Vec::new()), format).unwrap();
        archive
            .start_entry("metadata.yaml")
            .unwrap()
            .write_all(b"---\n_: header\n")
            .unwrap();
        archive
            .copy_entry("attachments/a1", &mut Cursor::new(b"cover bytes".to_vec()))
            .unwrap();
        archive.finish().unwrap().into_inner()
    }

    #[test]
    fn test_write_then_read_entries() {
        for format in [ContainerFormat::CompressedZip, ContainerFormat::StoredZip] {
            let bytes = build(format);
            let mut cursor = Cursor::new(bytes);
            assert!(is_archive(&mut cursor).unwrap());

            let mut archive = ArchiveReader::new(cursor).unwrap();
            assert_eq!(archive.len(), 2);
            assert_eq!(
                archive.read_to_string("metadata.yaml").unwrap(),
                "---\n_: header\n"
            );
            let content = archive
                .with_entry("attachments/a1", |entry| {
                    let mut buf = Vec::new();
                    entry.read_to_end(&mut buf).unwrap();
                    Ok(buf)
                })
                .unwrap();
            assert_eq!(content, b"cover bytes");
        }
    }

    #[test]
    fn test_missing_entry() {
        let mut archive =
            ArchiveReader::new(Cursor::new(build(ContainerFormat::StoredZip))).unwrap();
        assert!(matches!(
            archive.read_to_string("attachments/missing"),
            Err(Error::OperationFailed { .. })
        ));
    }

    #[test]
    fn test_plain_stream_is_not_archive() {
        assert!(!is_archive(&mut Cursor::new(b"---\n_: header".to_vec())).unwrap());
        assert!(!is_archive(&mut Cursor::new(b"P".to_vec())).unwrap());
        assert!(!is_archive(&mut Cursor::new(Vec::new())).unwrap());
    }

    #[test]
    fn test_yaml_is_not_an_archive_format() {
        assert!(ArchiveWriter::new(Cursor::new(Vec::new()), ContainerFormat::Yaml).is_err());
    }
}

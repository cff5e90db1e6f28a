//! YAML document stream codec.
//!
//! Each document is preceded by a `---` marker.

use super::Document;
use crate::{Error, Result};
use std::io::Write;

/// Writes container documents as a YAML document stream.
pub struct DocumentWriter<W: Write> {
    writer: W,
    /// Number of documents written.
    count: usize,
}

impl<W: Write> DocumentWriter<W> {
    /// Creates a new document writer.
    #[must_use]
    pub const fn new(writer: W) -> Self {
        Self { writer, count: 0 }
    }

    /// Writes one document.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the underlying write fails.
    pub fn write(&mut self, document: &Document) -> Result<()> {
        writeln!(self.writer, "---").map_err(|e| Error::OperationFailed {
            operation: "write_yaml".to_string(),
            cause: e.to_string(),
        })?;
        serde_yaml_ng::to_writer(&mut self.writer, document).map_err(|e| {
            Error::OperationFailed {
                operation: "write_yaml".to_string(),
                cause: e.to_string(),
            }
        })?;
        self.count += 1;
        Ok(())
    }

    /// Returns the number of documents written.
    #[must_use]
    pub const fn count(&self) -> usize {
        self.count
    }

    /// Flushes and returns the underlying writer.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing fails.
    pub fn finish(mut self) -> Result<W> {
        self.writer.flush().map_err(|e| Error::OperationFailed {
            operation: "flush_yaml".to_string(),
            cause: e.to_string(),
        })?;
        Ok(self.writer)
    }
}

/// Parses a YAML document stream.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] naming the failing document if any
/// document is malformed or carries an unknown `_` tag.
pub fn read_documents(content: &str) -> Result<Vec<Document>> {
    let mut documents = Vec::new();
    for (index, document) in serde_yaml_ng::Deserializer::from_str(content).enumerate() {
        let document: Document = serde::Deserialize::deserialize(document).map_err(|e| {
            Error::InvalidInput(format!("Document {}: Failed to parse YAML: {e}", index + 1))
        })?;
        documents.push(document);
    }
    Ok(documents)
}

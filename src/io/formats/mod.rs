//! Container formats.
//!
//! Every container carries the same YAML document stream: one header
//! document followed by one document per object. Plain containers are just
//! that stream; archive containers store it as `metadata.yaml` inside a ZIP
//! file next to one `attachments/<id>` entry per attachment.

pub mod archive;
pub mod yaml;

use crate::models::{Identity, RawFields};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Container format version written and accepted.
pub const FORMAT_VERSION: u32 = 1;

/// Name of the document stream entry inside archives.
pub const METADATA_ENTRY: &str = "metadata.yaml";

/// Returns the archive entry name of an attachment.
#[must_use]
pub fn attachment_entry(id: &str) -> String {
    format!("attachments/{id}")
}

/// Supported container formats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerFormat {
    /// Plain YAML document stream. Cannot carry attachments.
    #[default]
    #[serde(rename = "yaml")]
    Yaml,
    /// Deflate-compressed ZIP archive.
    #[serde(rename = "zip")]
    CompressedZip,
    /// Uncompressed ZIP archive.
    #[serde(rename = "zip-stored")]
    StoredZip,
}

impl ContainerFormat {
    /// Returns whether the format is ZIP based.
    #[must_use]
    pub const fn is_archive(&self) -> bool {
        matches!(self, Self::CompressedZip | Self::StoredZip)
    }

    /// Returns the conventional file extension.
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Yaml => "yaml",
            Self::CompressedZip | Self::StoredZip => "haul",
        }
    }

    /// Detects the format from a file extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the extension is not recognized.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match ext.as_deref() {
            Some("yaml" | "yml") => Ok(Self::Yaml),
            Some("zip" | "haul") => Ok(Self::CompressedZip),
            Some(ext) => Err(Error::InvalidInput(format!(
                "Unsupported file extension: .{ext}"
            ))),
            None => Err(Error::InvalidInput(
                "Cannot determine format: file has no extension".to_string(),
            )),
        }
    }
}

impl FromStr for ContainerFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "yaml" | "yml" => Ok(Self::Yaml),
            "zip" | "compressed-zip" => Ok(Self::CompressedZip),
            "zip-stored" | "stored-zip" => Ok(Self::StoredZip),
            _ => Err(Error::InvalidInput(format!("Unknown format: {s}"))),
        }
    }
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Yaml => write!(f, "yaml"),
            Self::CompressedZip => write!(f, "zip"),
            Self::StoredZip => write!(f, "zip-stored"),
        }
    }
}

/// Attachment reference inside an object document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentEntry {
    /// Attachment id, naming the archive entry.
    pub id: String,
    /// Caller-defined key.
    #[serde(default)]
    pub key: Value,
}

/// One document of the container stream, discriminated by its `_` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "_", rename_all = "lowercase")]
pub enum Document {
    /// Container header.
    Header {
        /// Format version.
        version: u32,
        /// Kinds of the objects in the container.
        object_kinds: Vec<String>,
        /// Free-form caller metadata.
        #[serde(default)]
        metadata: Value,
    },
    /// One exported object.
    Object {
        /// Object identity.
        id: Identity,
        /// Encoded fields, without the primary key.
        data: RawFields,
        /// Attachments of the object.
        #[serde(default)]
        attachments: Vec<AttachmentEntry>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("yaml", ContainerFormat::Yaml; "yaml")]
    #[test_case("YML", ContainerFormat::Yaml; "yml uppercase")]
    #[test_case("zip", ContainerFormat::CompressedZip; "zip")]
    #[test_case("zip-stored", ContainerFormat::StoredZip; "stored")]
    fn test_format_from_str(input: &str, expected: ContainerFormat) {
        assert_eq!(input.parse::<ContainerFormat>().unwrap(), expected);
    }

    #[test_case("backup.yaml", ContainerFormat::Yaml; "yaml extension")]
    #[test_case("backup.haul", ContainerFormat::CompressedZip; "haul extension")]
    #[test_case("backup.ZIP", ContainerFormat::CompressedZip; "zip extension")]
    fn test_format_from_path(path: &str, expected: ContainerFormat) {
        assert_eq!(ContainerFormat::from_path(Path::new(path)).unwrap(), expected);
    }

    #[test]
    fn test_format_rejects_unknown() {
        assert!("tar".parse::<ContainerFormat>().is_err());
        assert!(ContainerFormat::from_path(Path::new("backup")).is_err());
        assert!(ContainerFormat::from_path(Path::new("backup.csv")).is_err());
    }

    #[test]
    fn test_format_display_round_trips() {
        for format in [
            ContainerFormat::Yaml,
            ContainerFormat::CompressedZip,
            ContainerFormat::StoredZip,
        ] {
            assert_eq!(format.to_string().parse::<ContainerFormat>().unwrap(), format);
        }
    }
}

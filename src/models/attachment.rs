//! Binary attachments carried alongside exported objects.

use serde_json::Value;
use std::fmt;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

/// Opens a fresh stream over an attachment's content.
pub type ContentProvider = Arc<dyn Fn() -> std::io::Result<Box<dyn Read>> + Send + Sync>;

/// Where an attachment's bytes come from.
#[derive(Clone)]
pub enum AttachmentSource {
    /// Export side: a callable producing the content stream on demand.
    Provider(ContentProvider),
    /// Import side: the content lives in the container archive under the
    /// attachment's id.
    Container,
}

impl fmt::Debug for AttachmentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Provider(_) => write!(f, "Provider(..)"),
            Self::Container => write!(f, "Container"),
        }
    }
}

/// A binary attachment of an object.
#[derive(Debug, Clone)]
pub struct Attachment {
    /// Unique id within the container.
    pub id: String,
    /// Caller-defined key, handed back verbatim on import.
    pub key: Value,
    /// Byte source.
    pub source: AttachmentSource,
}

impl Attachment {
    /// Creates an attachment streaming from a file on disk.
    #[must_use]
    pub fn from_path(key: impl Into<Value>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self::from_provider(key, move || {
            let file = std::fs::File::open(&path)?;
            Ok(Box::new(file) as Box<dyn Read>)
        })
    }

    /// Creates an attachment from in-memory bytes.
    #[must_use]
    pub fn from_data(key: impl Into<Value>, data: impl Into<Vec<u8>>) -> Self {
        let data: Arc<[u8]> = data.into().into();
        Self::from_provider(key, move || {
            Ok(Box::new(std::io::Cursor::new(Arc::clone(&data))) as Box<dyn Read>)
        })
    }

    /// Creates an attachment from an arbitrary content provider.
    #[must_use]
    pub fn from_provider<F>(key: impl Into<Value>, provider: F) -> Self
    where
        F: Fn() -> std::io::Result<Box<dyn Read>> + Send + Sync + 'static,
    {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            key: key.into(),
            source: AttachmentSource::Provider(Arc::new(provider)),
        }
    }

    /// Creates an attachment whose content lives in an opened container.
    #[must_use]
    pub fn in_container(id: impl Into<String>, key: Value) -> Self {
        Self {
            id: id.into(),
            key,
            source: AttachmentSource::Container,
        }
    }

    /// Opens the content stream of an export-side attachment.
    ///
    /// # Errors
    ///
    /// Returns an error if the attachment has no provider or the provider
    /// fails.
    pub fn open(&self) -> crate::Result<Box<dyn Read>> {
        match &self.source {
            AttachmentSource::Provider(provider) => {
                provider().map_err(|e| crate::Error::OperationFailed {
                    operation: "open_attachment".to_string(),
                    cause: format!("{}: {e}", self.id),
                })
            },
            AttachmentSource::Container => Err(crate::Error::InvalidInput(format!(
                "attachment {} is stored in a container and has no content provider",
                self.id
            ))),
        }
    }
}

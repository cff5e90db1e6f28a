//! Export-side policy.

use crate::Result;
use crate::models::{Attachment, Identity, Instance};
use crate::storage::RecordStore;

/// Hooks filtering and enriching exported objects.
pub trait ExportPolicy {
    /// Returns whether an object should be exported at all.
    ///
    /// References to refused objects are dropped from their referrers.
    fn should_export_object(&self, store: &dyn RecordStore, instance: &Instance) -> bool {
        let _ = (store, instance);
        true
    }

    /// Returns whether an optional reference should be followed.
    ///
    /// Only consulted for nullable references; required references are
    /// always followed.
    fn should_follow_reference(&self, instance: &Instance, target: &Identity, field: &str) -> bool {
        let _ = (instance, target, field);
        true
    }

    /// Returns the binary attachments of an object.
    ///
    /// # Errors
    ///
    /// An error aborts the export.
    fn get_attachments(
        &self,
        store: &dyn RecordStore,
        instance: &Instance,
    ) -> Result<Vec<Attachment>> {
        let _ = (store, instance);
        Ok(Vec::new())
    }
}

/// Export policy using every default.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultExportPolicy;

impl ExportPolicy for DefaultExportPolicy {}

//! Import-side policy.

use super::RelinkAction;
use crate::models::{FieldMap, Instance, Record};
use crate::{Error, Result};
use serde_json::Value;
use std::io::Read;

/// How collection relations are merged into an existing instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ManyToManyMode {
    /// Replace the whole collection.
    #[default]
    Replace,
    /// Add new members, keeping existing ones.
    Append,
}

/// Hooks deciding how imported objects land in the destination store.
///
/// Every method has a default, so implementors override only what they
/// need. The defaults create every object, replace collections, and fail on
/// attachments.
pub trait ImportPolicy {
    /// Called once per object right after its references are resolved.
    ///
    /// # Errors
    ///
    /// An error aborts the import.
    fn preprocess_fields(&mut self, kind: &str, fields: &mut FieldMap) -> Result<()> {
        let _ = (kind, fields);
        Ok(())
    }

    /// Called once per object after [`ImportPolicy::relink`] and before its
    /// action executes.
    ///
    /// # Errors
    ///
    /// An error aborts the import.
    fn postprocess_fields(&mut self, kind: &str, fields: &mut FieldMap) -> Result<()> {
        let _ = (kind, fields);
        Ok(())
    }

    /// Picks the relink action for an object. Defaults to
    /// [`RelinkAction::create`].
    fn relink(&mut self, kind: &str, record: &Record) -> RelinkAction {
        let _ = (kind, record);
        RelinkAction::create()
    }

    /// Picks the merge mode of a collection field.
    fn many_to_many_mode(&self, instance: &Instance, field: &str) -> ManyToManyMode {
        let _ = (instance, field);
        ManyToManyMode::Replace
    }

    /// Consumes one attachment of a materialized object.
    ///
    /// The stream is only readable during the call.
    ///
    /// # Errors
    ///
    /// The default fails with [`Error::NotImplemented`].
    fn process_attachment(
        &mut self,
        instance: &Instance,
        key: &Value,
        stream: &mut dyn Read,
    ) -> Result<()> {
        let _ = (key, stream);
        Err(Error::NotImplemented(format!(
            "attachments found for {instance} but the import policy does not process attachments"
        )))
    }

    /// Called after an object has been materialized.
    ///
    /// # Errors
    ///
    /// An error aborts the import.
    fn post_import(&mut self, instance: &Instance) -> Result<()> {
        let _ = instance;
        Ok(())
    }
}

/// Import policy using every default.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultImportPolicy;

impl ImportPolicy for DefaultImportPolicy {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::ActionKind;

    #[test]
    fn test_defaults() {
        let mut policy = DefaultImportPolicy;
        let instance = Instance::new("library:book", 1);
        let record = Record::new(instance.identity(), crate::models::RawFields::new());

        assert_eq!(
            policy.relink("library:book", &record).kind,
            ActionKind::Create {
                ignore_fields: Vec::new()
            }
        );
        assert_eq!(
            policy.many_to_many_mode(&instance, "tags"),
            ManyToManyMode::Replace
        );
        assert!(matches!(
            policy.process_attachment(&instance, &Value::Null, &mut std::io::empty()),
            Err(Error::NotImplemented(_))
        ));
    }
}

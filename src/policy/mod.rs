//! Import and export policies.
//!
//! Policies are capability traits with default methods: callers implement
//! only the hooks they care about and pass the policy value to the engine.
//!
//! | Trait | Hooks |
//! |-------|-------|
//! | [`ExportPolicy`] | object filter, reference filter, attachments |
//! | [`ImportPolicy`] | field pre/post-processing, relink choice, collection merge mode, attachment handler |

mod export;
mod import;
pub mod relink;

pub use export::{DefaultExportPolicy, ExportPolicy};
pub use import::{DefaultImportPolicy, ImportPolicy, ManyToManyMode};
pub use relink::{
    ActionKind, CustomAction, Overwrite, RelinkAction, RelinkContext, RelinkStrategy, Relinked,
};

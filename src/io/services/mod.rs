//! Export and import containers.
//!
//! Orchestrate codecs, policies, the import engine and container framing.

pub mod export;
pub mod import;

pub use export::ExportContainer;
pub use import::{ImportContainer, ImportSession};

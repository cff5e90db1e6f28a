//! Storage layer abstraction.
//!
//! This module describes the records haul moves around:
//! - **Schema**: kinds, their fields and relation cardinality
//! - **Traits**: the [`SchemaRegistry`] and [`RecordStore`] contracts the
//!   engines are written against
//! - **Memory**: an in-memory [`RecordStore`] for tests and tooling

pub mod memory;
mod schema;
pub mod traits;

pub use memory::MemoryStore;
pub use schema::{FieldSchema, KindSchema, Relation};
pub use traits::{RecordStore, SchemaRegistry};

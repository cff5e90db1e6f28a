//! Typed references between objects.

use super::Identity;

/// An edge from one object to one or more target identities.
///
/// Single-valued relations carry exactly one target; collections carry zero
/// or more. Weak references (reverse collections) never gate import order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Target identities, in field order.
    pub ids: Vec<Identity>,
    /// Name of the field holding the reference.
    pub field: String,
    /// Whether the field may be nulled when a target is discarded.
    pub nullable: bool,
    /// Whether the reference is excluded from dependency ordering.
    pub weak: bool,
}

impl Reference {
    /// Creates a single-valued reference.
    #[must_use]
    pub fn to_one(field: impl Into<String>, id: Identity, nullable: bool) -> Self {
        Self {
            ids: vec![id],
            field: field.into(),
            nullable,
            weak: false,
        }
    }

    /// Creates a collection reference.
    #[must_use]
    pub fn to_many(field: impl Into<String>, ids: Vec<Identity>) -> Self {
        Self {
            ids,
            field: field.into(),
            nullable: true,
            weak: false,
        }
    }

    /// Marks the reference as weak.
    #[must_use]
    pub const fn weak(mut self) -> Self {
        self.weak = true;
        self
    }
}

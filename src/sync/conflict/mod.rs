//! Field-level conflict resolution
//!
//! Provides:
//! - Per-field merge policies (max, min, or, latest, earliest, union)
//! - Per-entity merges composed from those policies
//! - A `changed` flag so callers skip redundant local writes

mod policy;
mod resolver;

pub use policy::{
    earliest_wins, latest_wins, max_wins, min_wins, or_wins, remote_is_newer, union_by_id,
};
pub use resolver::MergeResolver;

/// Result of merging a remote copy into a local one
#[derive(Debug, Clone, PartialEq)]
pub struct Merged<T> {
    /// The merged value
    pub value: T,
    /// Whether `value` differs from the local copy
    pub changed: bool,
}

impl<T: PartialEq> Merged<T> {
    /// Merged value, flagged as changed if it differs from `local`
    pub fn compare(local: &T, value: T) -> Self {
        let changed = *local != value;
        Self { value, changed }
    }
}

impl<T> Merged<T> {
    /// No local copy existed
    pub fn inserted(value: T) -> Self {
        Self {
            value,
            changed: true,
        }
    }

    /// Local copy kept as is
    pub fn unchanged(value: T) -> Self {
        Self {
            value,
            changed: false,
        }
    }
}

//! Local persistence interface consumed by the sync engine

use crate::error::Result;
use crate::types::{Entity, SyncMarker};

/// Durable, synchronous local storage keyed by stable identifiers
pub trait LocalStore: Send + Sync + 'static {
    /// Load one entity by key
    fn load<T: Entity>(&self, key: &str) -> Result<Option<T>>;

    /// Insert or replace an entity under its key
    fn save<T: Entity>(&self, value: &T) -> Result<()>;

    /// Load every entity of a type
    fn load_all<T: Entity>(&self) -> Result<Vec<T>>;

    /// Save several entities
    fn save_many<T: Entity>(&self, values: &[T]) -> Result<()> {
        for value in values {
            self.save(value)?;
        }
        Ok(())
    }

    /// Last recorded sync outcome
    fn load_sync_marker(&self) -> Result<SyncMarker>;

    /// Record a sync outcome
    fn save_sync_marker(&self, marker: &SyncMarker) -> Result<()>;
}

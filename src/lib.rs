//! Walksync - multi-device state synchronization for a walking/fitness app
//!
//! Keeps streaks, shields, profile, daily step logs and tracked walks in sync
//! across a user's devices through a user-scoped remote namespace, using
//! field-level merge policies instead of last-writer-wins.

pub mod error;
pub mod events;
pub mod storage;
pub mod sync;
pub mod types;

pub use error::{Result, WalkSyncError};
pub use events::{ChangeNotifier, SyncEvent};
pub use storage::{LocalStore, Storage};
pub use sync::SyncOrchestrator;
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

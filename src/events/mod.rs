//! Change notifications
//!
//! Local writes announce "entity X changed"; the sync engine subscribes to
//! schedule pushes and announces the outcome of each cycle.

mod event;
mod notifier;

pub use event::{EventType, Origin, SyncEvent};
pub use notifier::{ChangeNotifier, MergeScope};

//! Multi-device sync engine
//!
//! Local entities are mapped to remote records, written in bounded batches,
//! read back page by page and merged field by field. The orchestrator ties
//! these together with debouncing, in-flight guards and retry/backoff.
//!
//! # Feature Flags
//!
//! The S3 remote requires the `cloud` feature. The in-memory and directory
//! remotes, and all merge logic, are always available.

mod batch;
#[cfg(feature = "cloud")]
mod cloud;
pub mod conflict;
mod dir;
mod mapper;
mod memory;
mod orchestrator;
mod pager;
mod probe;
mod record;
mod remote;
mod zone;

pub use batch::{BatchReport, BatchedWriter};
#[cfg(feature = "cloud")]
pub use cloud::S3Remote;
pub use conflict::{MergeResolver, Merged};
pub use dir::DirRemote;
pub use mapper::{RecordMapper, SyncEntity, PAYLOAD_VERSION};
pub use memory::MemoryRemote;
pub use orchestrator::{PullReport, PushReport, SyncOrchestrator};
pub use pager::PaginatedReader;
pub use probe::ExistenceProbe;
pub use record::{Cursor, FieldValue, Page, RecordType, RemoteRecord};
pub use remote::RemoteStore;
pub use zone::ZoneProvisioner;

use std::fmt;

use serde::{Deserialize, Serialize};

/// Sync direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    Push,
    Pull,
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncDirection::Push => write!(f, "push"),
            SyncDirection::Pull => write!(f, "pull"),
        }
    }
}

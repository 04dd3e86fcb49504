//! Event types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sync::{RecordType, SyncDirection};

/// Types of events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    LocalChanged,
    SyncStarted,
    SyncCompleted,
    SyncFailed,
}

/// Who caused a local change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// App or user activity; should be pushed
    #[default]
    Local,
    /// Written back by a merge; must not trigger a push
    Sync,
}

/// An event on the notifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncEvent {
    /// Event type
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Timestamp
    pub timestamp: DateTime<Utc>,
    /// Origin of a local change
    #[serde(default)]
    pub origin: Origin,
    /// Changed entity type (for local changes)
    pub record_type: Option<RecordType>,
    /// Changed entity key (for local changes)
    pub key: Option<String>,
    /// Direction of a sync cycle
    pub direction: Option<SyncDirection>,
    /// Entities written by a sync cycle
    pub changes: Option<usize>,
    /// Failure description
    pub error: Option<String>,
}

impl SyncEvent {
    fn bare(event_type: EventType) -> Self {
        Self {
            event_type,
            timestamp: Utc::now(),
            origin: Origin::Local,
            record_type: None,
            key: None,
            direction: None,
            changes: None,
            error: None,
        }
    }

    /// Create a local change event
    pub fn local_changed(record_type: RecordType, key: impl Into<String>, origin: Origin) -> Self {
        Self {
            origin,
            record_type: Some(record_type),
            key: Some(key.into()),
            ..Self::bare(EventType::LocalChanged)
        }
    }

    /// Create a sync started event
    pub fn sync_started(direction: SyncDirection) -> Self {
        Self {
            direction: Some(direction),
            ..Self::bare(EventType::SyncStarted)
        }
    }

    /// Create a sync completed event
    pub fn sync_completed(direction: SyncDirection, changes: usize) -> Self {
        Self {
            direction: Some(direction),
            changes: Some(changes),
            ..Self::bare(EventType::SyncCompleted)
        }
    }

    /// Create a sync failed event
    pub fn sync_failed(direction: SyncDirection, error: &str) -> Self {
        Self {
            direction: Some(direction),
            error: Some(error.to_string()),
            ..Self::bare(EventType::SyncFailed)
        }
    }

    /// A local change that should be pushed
    pub fn is_pushable_change(&self) -> bool {
        self.event_type == EventType::LocalChanged && self.origin == Origin::Local
    }
}

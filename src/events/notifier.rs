//! Broadcast notifier with merge-scope tagging

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

use super::event::{Origin, SyncEvent};
use crate::sync::RecordType;

/// Buffered events per subscriber before the slowest one starts lagging
const CHANNEL_CAPACITY: usize = 1000;

struct NotifierInner {
    tx: broadcast::Sender<SyncEvent>,
    merge_depth: AtomicUsize,
}

/// Publish/subscribe hub for local changes and sync outcomes
#[derive(Clone)]
pub struct ChangeNotifier {
    inner: Arc<NotifierInner>,
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeNotifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(NotifierInner {
                tx,
                merge_depth: AtomicUsize::new(0),
            }),
        }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.tx.subscribe()
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: SyncEvent) {
        // No subscribers is fine
        let _ = self.inner.tx.send(event);
    }

    /// Announce a local write. Inside a merge scope the change is tagged as
    /// sync-originated so listeners do not push it back.
    pub fn local_changed(&self, record_type: RecordType, key: &str) {
        let origin = if self.is_merging() {
            Origin::Sync
        } else {
            Origin::Local
        };
        self.publish(SyncEvent::local_changed(record_type, key, origin));
    }

    /// True while a merge is writing back to local storage
    pub fn is_merging(&self) -> bool {
        self.inner.merge_depth.load(Ordering::Acquire) > 0
    }

    /// Open a merge scope; closes when the returned guard is dropped
    pub fn merge_scope(&self) -> MergeScope {
        self.inner.merge_depth.fetch_add(1, Ordering::AcqRel);
        MergeScope {
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.tx.receiver_count()
    }
}

/// Guard for the merge-then-persist critical section
pub struct MergeScope {
    inner: Arc<NotifierInner>,
}

impl Drop for MergeScope {
    fn drop(&mut self) {
        self.inner.merge_depth.fetch_sub(1, Ordering::AcqRel);
    }
}

//! In-process remote store
//!
//! Backs tests and local experiments. Two orchestrators sharing one
//! `Arc<MemoryRemote>` behave like two devices sharing a cloud namespace.
//! Faults can be injected per write call, per fetched type and on provisioning.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use super::record::{Cursor, Page, RecordType, RemoteRecord};
use super::remote::{offset_cursor, parse_offset_cursor, RemoteStore};
use crate::error::{Result, WalkSyncError};

/// Default page size for queries
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Default per-request write limit
pub const DEFAULT_WRITE_LIMIT: usize = 400;

#[derive(Default)]
struct MemoryState {
    exists: bool,
    records: BTreeMap<(RecordType, String), RemoteRecord>,
    write_calls: usize,
    provision_calls: usize,
    fail_write_calls: HashSet<usize>,
    /// Record type -> number of pages served before the fetch fails
    fail_fetch: HashMap<RecordType, usize>,
    fail_provisioning: bool,
    unreachable: bool,
}

/// Remote store kept entirely in memory
pub struct MemoryRemote {
    namespace: String,
    page_size: usize,
    write_limit: usize,
    latency: Mutex<Option<Duration>>,
    write_latency: Mutex<Option<Duration>>,
    state: Mutex<MemoryState>,
}

impl MemoryRemote {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            page_size: DEFAULT_PAGE_SIZE,
            write_limit: DEFAULT_WRITE_LIMIT,
            latency: Mutex::new(None),
            write_latency: Mutex::new(None),
            state: Mutex::new(MemoryState::default()),
        }
    }

    /// Set the number of records returned per page
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Set the maximum records accepted per write request
    pub fn with_write_limit(mut self, write_limit: usize) -> Self {
        self.write_limit = write_limit;
        self
    }

    /// Fail the nth (1-based) write call from now on
    pub fn fail_write_call(&self, call: usize) {
        self.state.lock().fail_write_calls.insert(call);
    }

    /// Fail fetches of a type after `after_pages` pages were served
    pub fn fail_fetch(&self, record_type: RecordType, after_pages: usize) {
        self.state.lock().fail_fetch.insert(record_type, after_pages);
    }

    pub fn fail_provisioning(&self, fail: bool) {
        self.state.lock().fail_provisioning = fail;
    }

    /// Make every call fail with a transport error
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unreachable = unreachable;
    }

    /// Delay applied to single-record fetches
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// Delay applied to every write call before it takes effect
    pub fn set_write_latency(&self, latency: Option<Duration>) {
        *self.write_latency.lock() = latency;
    }

    pub fn clear_faults(&self) {
        let mut state = self.state.lock();
        state.fail_write_calls.clear();
        state.fail_fetch.clear();
        state.fail_provisioning = false;
        state.unreachable = false;
    }

    pub fn write_calls(&self) -> usize {
        self.state.lock().write_calls
    }

    pub fn provision_calls(&self) -> usize {
        self.state.lock().provision_calls
    }

    pub fn namespace_exists(&self) -> bool {
        self.state.lock().exists
    }

    pub fn record_count(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn count_of(&self, record_type: RecordType) -> usize {
        self.state
            .lock()
            .records
            .keys()
            .filter(|(kind, _)| *kind == record_type)
            .count()
    }

    /// Read a record without going through the async API
    pub fn get(&self, record_type: RecordType, record_name: &str) -> Option<RemoteRecord> {
        self.state
            .lock()
            .records
            .get(&(record_type, record_name.to_string()))
            .cloned()
    }

    fn check_reachable(state: &MemoryState) -> Result<()> {
        if state.unreachable {
            return Err(WalkSyncError::Remote("network unreachable".to_string()));
        }
        Ok(())
    }

    fn check_zone(&self, state: &MemoryState) -> Result<()> {
        Self::check_reachable(state)?;
        if !state.exists {
            return Err(WalkSyncError::ZoneNotFound(self.namespace.clone()));
        }
        Ok(())
    }

    fn page_from(&self, record_type: RecordType, offset: usize) -> Result<Page> {
        let state = self.state.lock();
        self.check_zone(&state)?;

        if let Some(&after_pages) = state.fail_fetch.get(&record_type) {
            if offset / self.page_size >= after_pages {
                return Err(WalkSyncError::Remote(format!(
                    "injected fetch failure for {} at offset {}",
                    record_type, offset
                )));
            }
        }

        let mut matching = state
            .records
            .iter()
            .filter(|((kind, _), _)| *kind == record_type)
            .skip(offset);
        let records: Vec<RemoteRecord> = matching
            .by_ref()
            .take(self.page_size)
            .map(|(_, record)| record.clone())
            .collect();
        let cursor = matching
            .next()
            .map(|_| offset_cursor(record_type, offset + records.len()));

        Ok(Page { records, cursor })
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn ensure_namespace(&self) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_reachable(&state)?;
        state.provision_calls += 1;
        if state.fail_provisioning {
            return Err(WalkSyncError::Provisioning(format!(
                "injected provisioning failure for {}",
                self.namespace
            )));
        }
        if state.exists {
            return Err(WalkSyncError::NamespaceExists(self.namespace.clone()));
        }
        state.exists = true;
        Ok(())
    }

    async fn write_batch(&self, records: Vec<RemoteRecord>, _atomic: bool) -> Result<()> {
        let latency = *self.write_latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock();
        self.check_zone(&state)?;
        state.write_calls += 1;

        if records.len() > self.write_limit {
            return Err(WalkSyncError::LimitExceeded {
                limit: self.write_limit,
                actual: records.len(),
            });
        }
        let call = state.write_calls;
        if state.fail_write_calls.contains(&call) {
            return Err(WalkSyncError::Remote(format!(
                "injected failure on write call {}",
                call
            )));
        }

        let now = Utc::now();
        for mut record in records {
            record.modified_at = Some(now);
            state
                .records
                .insert((record.record_type, record.record_name.clone()), record);
        }
        Ok(())
    }

    async fn fetch_single(&self, record_type: RecordType, record_name: &str) -> Result<RemoteRecord> {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let state = self.state.lock();
        self.check_zone(&state)?;
        state
            .records
            .get(&(record_type, record_name.to_string()))
            .cloned()
            .ok_or_else(|| WalkSyncError::RecordNotFound(record_name.to_string()))
    }

    async fn query_all(&self, record_type: RecordType) -> Result<Page> {
        self.page_from(record_type, 0)
    }

    async fn fetch_page(&self, cursor: &Cursor) -> Result<Page> {
        let (record_type, offset) = parse_offset_cursor(cursor)?;
        self.page_from(record_type, offset)
    }

    async fn delete_namespace(&self) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_reachable(&state)?;
        state.exists = false;
        state.records.clear();
        Ok(())
    }

    fn describe(&self) -> String {
        format!("memory://{}", self.namespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> RemoteRecord {
        RemoteRecord::new(RecordType::DailyLog, name, b"{}".to_vec())
    }

    #[tokio::test]
    async fn test_second_provision_reports_exists() {
        let remote = MemoryRemote::new("user-1");
        remote.ensure_namespace().await.unwrap();
        let err = remote.ensure_namespace().await.unwrap_err();
        assert!(matches!(err, WalkSyncError::NamespaceExists(_)));
    }

    #[tokio::test]
    async fn test_write_requires_namespace() {
        let remote = MemoryRemote::new("user-1");
        let err = remote.write_batch(vec![record("a")], false).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_pages_walk_all_records() {
        let remote = MemoryRemote::new("user-1").with_page_size(2);
        remote.ensure_namespace().await.unwrap();
        remote
            .write_batch((0..5).map(|i| record(&format!("r{}", i))).collect(), false)
            .await
            .unwrap();

        let first = remote.query_all(RecordType::DailyLog).await.unwrap();
        assert_eq!(first.records.len(), 2);
        let second = remote.fetch_page(first.cursor.as_ref().unwrap()).await.unwrap();
        assert_eq!(second.records.len(), 2);
        let third = remote.fetch_page(second.cursor.as_ref().unwrap()).await.unwrap();
        assert_eq!(third.records.len(), 1);
        assert!(third.cursor.is_none());
    }

    #[tokio::test]
    async fn test_overwrite_by_identity() {
        let remote = MemoryRemote::new("user-1");
        remote.ensure_namespace().await.unwrap();
        remote.write_batch(vec![record("same")], false).await.unwrap();
        remote.write_batch(vec![record("same")], false).await.unwrap();
        assert_eq!(remote.record_count(), 1);
        assert!(remote.get(RecordType::DailyLog, "same").unwrap().modified_at.is_some());
    }

    #[tokio::test]
    async fn test_write_limit_enforced() {
        let remote = MemoryRemote::new("user-1").with_write_limit(2);
        remote.ensure_namespace().await.unwrap();
        let err = remote
            .write_batch(vec![record("a"), record("b"), record("c")], false)
            .await
            .unwrap_err();
        assert!(matches!(err, WalkSyncError::LimitExceeded { limit: 2, actual: 3 }));
    }
}

//! Sync orchestration: debounced push, fan-out pull, retry with backoff

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::batch::BatchedWriter;
use super::conflict::{MergeResolver, Merged};
use super::mapper::RecordMapper;
use super::pager::PaginatedReader;
use super::probe::ExistenceProbe;
use super::record::{RecordType, RemoteRecord};
use super::remote::RemoteStore;
use super::zone::ZoneProvisioner;
use super::SyncDirection;
use crate::error::{Result, WalkSyncError};
use crate::events::{ChangeNotifier, SyncEvent};
use crate::storage::LocalStore;
use crate::types::{
    DailyLog, GameState, SyncConfig, SyncMarker, SyncSnapshot, SyncStatus, TrackedWalk,
    GAME_STATE_KEY,
};

/// Outcome of a completed push
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushReport {
    /// Records written remotely
    pub written: usize,
    /// Chunks submitted
    pub chunks: usize,
    /// Local entities that could not be encoded
    pub skipped: usize,
}

/// Outcome of a completed pull
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullReport {
    /// Remote records read across all types
    pub fetched: usize,
    /// Local entities inserted or updated by the merge
    pub merged: usize,
}

/// Single-shot timer slot. Scheduling bumps the generation and aborts the
/// predecessor; a firing task claims the slot only if its generation is current.
#[derive(Default)]
struct TimerSlot {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

impl TimerSlot {
    fn cancel(&mut self) {
        self.generation += 1;
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    fn arm(&mut self, spawn: impl FnOnce(u64) -> JoinHandle<()>) {
        self.cancel();
        self.handle = Some(spawn(self.generation));
    }

    /// Detach the firing task from the slot so later cancels cannot abort it
    fn claim(&mut self, generation: u64) -> bool {
        if self.generation != generation {
            return false;
        }
        self.handle = None;
        true
    }

    fn is_armed(&self) -> bool {
        self.handle.is_some()
    }
}

/// Clears an in-flight flag on drop. SeqCst pairs with `push_requested`.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Directions whose last run failed, with the error each reported.
/// One retry timer serves all of them.
#[derive(Debug, Default)]
struct PendingRetry {
    push: Option<String>,
    pull: Option<String>,
}

impl PendingRetry {
    fn slot(&mut self, direction: SyncDirection) -> &mut Option<String> {
        match direction {
            SyncDirection::Push => &mut self.push,
            SyncDirection::Pull => &mut self.pull,
        }
    }

    /// Push first, so a retried pull sees what the push wrote
    fn directions(&self) -> Vec<SyncDirection> {
        let mut directions = Vec::with_capacity(2);
        if self.push.is_some() {
            directions.push(SyncDirection::Push);
        }
        if self.pull.is_some() {
            directions.push(SyncDirection::Pull);
        }
        directions
    }

    fn outstanding_error(&self) -> Option<String> {
        self.push.clone().or_else(|| self.pull.clone())
    }
}

struct OrchestratorInner<L> {
    store: Arc<L>,
    remote: Arc<dyn RemoteStore>,
    notifier: ChangeNotifier,
    config: SyncConfig,
    zone: ZoneProvisioner,
    writer: BatchedWriter,
    reader: PaginatedReader,
    probe: ExistenceProbe,
    push_in_flight: AtomicBool,
    pull_in_flight: AtomicBool,
    /// Set by every push request; cleared by the push that serves it
    push_requested: AtomicBool,
    retry_attempt: AtomicU32,
    pending_retry: Mutex<PendingRetry>,
    debounce: Mutex<TimerSlot>,
    retry: Mutex<TimerSlot>,
    status: watch::Sender<SyncSnapshot>,
}

/// Coordinates pushes and pulls for one user namespace.
///
/// Cheap to clone; clones share timers, guards and status. Methods that
/// schedule work (`schedule_push`, retries, the spawn helpers) must run inside
/// a tokio runtime.
pub struct SyncOrchestrator<L: LocalStore> {
    inner: Arc<OrchestratorInner<L>>,
}

impl<L: LocalStore> Clone for SyncOrchestrator<L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<L: LocalStore> SyncOrchestrator<L> {
    pub fn new(
        store: Arc<L>,
        remote: Arc<dyn RemoteStore>,
        notifier: ChangeNotifier,
        config: SyncConfig,
    ) -> Result<Self> {
        config.validate()?;

        let marker = store.load_sync_marker()?;
        let (status, _) = watch::channel(SyncSnapshot {
            last_sync: marker.last_sync,
            ..SyncSnapshot::default()
        });

        let inner = OrchestratorInner {
            zone: ZoneProvisioner::new(Arc::clone(&remote)),
            writer: BatchedWriter::new(Arc::clone(&remote), config.max_batch_size),
            reader: PaginatedReader::new(Arc::clone(&remote), config.max_pages),
            probe: ExistenceProbe::new(Arc::clone(&remote), config.probe_timeout()),
            store,
            remote,
            notifier,
            config,
            push_in_flight: AtomicBool::new(false),
            pull_in_flight: AtomicBool::new(false),
            push_requested: AtomicBool::new(false),
            retry_attempt: AtomicU32::new(0),
            pending_retry: Mutex::new(PendingRetry::default()),
            debounce: Mutex::new(TimerSlot::default()),
            retry: Mutex::new(TimerSlot::default()),
            status,
        };

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.inner.notifier
    }

    /// Current status snapshot
    pub fn status(&self) -> SyncSnapshot {
        self.inner.status.borrow().clone()
    }

    /// Observe status changes
    pub fn subscribe_status(&self) -> watch::Receiver<SyncSnapshot> {
        self.inner.status.subscribe()
    }

    /// True while merged results are being written to local storage
    pub fn is_merging(&self) -> bool {
        self.inner.notifier.is_merging()
    }

    pub fn has_pending_push(&self) -> bool {
        self.inner.debounce.lock().is_armed()
    }

    pub fn has_pending_retry(&self) -> bool {
        self.inner.retry.lock().is_armed()
    }

    /// Restart the debounce window; one push fires after it elapses quietly
    pub fn schedule_push(&self) {
        let delay = self.inner.config.debounce();
        let this = self.clone();
        self.inner.debounce.lock().arm(move |generation| {
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let claimed = this.inner.debounce.lock().claim(generation);
                if !claimed {
                    return;
                }
                // Failures are recorded and retried by push_all itself
                let _ = this.push_all().await;
            })
        });
        debug!(delay_ms = delay.as_millis() as u64, "Push scheduled");
    }

    /// Push every local entity.
    ///
    /// Returns `Ok(None)` if a push is already running. That push runs once
    /// more when it finishes, so the request is served with current data.
    pub async fn push_all(&self) -> Result<Option<PushReport>> {
        self.inner.debounce.lock().cancel();
        self.inner.push_requested.store(true, Ordering::SeqCst);

        let mut report = None;
        while self.inner.push_requested.load(Ordering::SeqCst) {
            let Some(_guard) = InFlight::acquire(&self.inner.push_in_flight) else {
                debug!("Push already in flight; queued behind it");
                break;
            };
            self.inner.push_requested.store(false, Ordering::SeqCst);
            if report.is_some() {
                debug!("Running queued push");
            }
            report = Some(self.push_once().await?);
        }
        Ok(report)
    }

    async fn push_once(&self) -> Result<PushReport> {
        self.begin(SyncDirection::Push);
        let started = Instant::now();
        match self.run_push().await {
            Ok(report) => {
                info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    written = report.written,
                    chunks = report.chunks,
                    skipped = report.skipped,
                    "Push completed"
                );
                self.succeed(SyncDirection::Push, report.written);
                Ok(report)
            }
            Err(e) => {
                self.fail(SyncDirection::Push, &e);
                Err(e)
            }
        }
    }

    async fn run_push(&self) -> Result<PushReport> {
        self.inner.zone.ensure().await?;

        let (records, skipped) = self.outgoing_records()?;
        let batch = self.inner.writer.write(records).await?;

        Ok(PushReport {
            written: batch.written,
            chunks: batch.chunks,
            skipped,
        })
    }

    fn outgoing_records(&self) -> Result<(Vec<RemoteRecord>, usize)> {
        let store = &self.inner.store;

        let game: Vec<GameState> = store.load(GAME_STATE_KEY)?.into_iter().collect();
        let logs: Vec<DailyLog> = store.load_all()?;
        let walks: Vec<TrackedWalk> = store.load_all()?;

        let (mut records, mut skipped) = RecordMapper::to_remote_all(&game);
        for (more, failed) in [
            RecordMapper::to_remote_all(&logs),
            RecordMapper::to_remote_all(&walks),
        ] {
            records.extend(more);
            skipped += failed;
        }
        Ok((records, skipped))
    }

    /// Fetch and merge every record type. Returns `Ok(None)` if a pull is
    /// already running.
    ///
    /// Types fetch concurrently; a failed type does not stop the others; types
    /// that did arrive are merged and persisted before the error is reported.
    pub async fn pull_all(&self) -> Result<Option<PullReport>> {
        let Some(_guard) = InFlight::acquire(&self.inner.pull_in_flight) else {
            debug!("Pull already in flight");
            return Ok(None);
        };

        self.begin(SyncDirection::Pull);
        let started = Instant::now();
        match self.run_pull().await {
            Ok(report) => {
                info!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    fetched = report.fetched,
                    merged = report.merged,
                    "Pull completed"
                );
                self.succeed(SyncDirection::Pull, report.merged);
                Ok(Some(report))
            }
            Err(e) => {
                self.fail(SyncDirection::Pull, &e);
                Err(e)
            }
        }
    }

    async fn run_pull(&self) -> Result<PullReport> {
        self.inner.zone.ensure().await?;

        let reader = &self.inner.reader;
        let fetched = join_all(
            RecordType::ALL
                .iter()
                .map(|&record_type| async move { (record_type, reader.fetch_all(record_type).await) }),
        )
        .await;

        let mut report = PullReport::default();
        let mut failed = Vec::new();

        let _scope = self.inner.notifier.merge_scope();
        for (record_type, result) in fetched {
            let applied = result.and_then(|records| {
                report.fetched += records.len();
                self.apply(record_type, &records)
            });
            match applied {
                Ok(merged) => {
                    debug!(%record_type, merged, "Merged remote records");
                    report.merged += merged;
                }
                Err(e) => {
                    warn!(%record_type, error = %e, "Record type not merged");
                    failed.push(record_type);
                }
            }
        }

        if failed.is_empty() {
            Ok(report)
        } else {
            Err(WalkSyncError::PullIncomplete(failed))
        }
    }

    fn apply(&self, record_type: RecordType, records: &[RemoteRecord]) -> Result<usize> {
        match record_type {
            RecordType::GameState => self.apply_game_state(records),
            RecordType::DailyLog => self.apply_daily_logs(records),
            RecordType::TrackedWalk => self.apply_walks(records),
        }
    }

    fn apply_game_state(&self, records: &[RemoteRecord]) -> Result<usize> {
        let store = &self.inner.store;
        let mut merged = 0;

        for remote in RecordMapper::from_remote_all::<GameState>(records) {
            let result = match store.load::<GameState>(GAME_STATE_KEY)? {
                Some(local) => MergeResolver::merge_game_state(&local, &remote),
                None => Merged::inserted(remote),
            };
            if result.changed {
                store.save(&result.value)?;
                merged += 1;
            }
        }
        Ok(merged)
    }

    fn apply_daily_logs(&self, records: &[RemoteRecord]) -> Result<usize> {
        let store = &self.inner.store;
        let mut local: HashMap<String, DailyLog> = store
            .load_all::<DailyLog>()?
            .into_iter()
            .map(|log| (log.day.clone(), log))
            .collect();

        let mut changed = Vec::new();
        for remote in RecordMapper::from_remote_all::<DailyLog>(records) {
            let result = MergeResolver::merge_daily_log(local.get(&remote.day), &remote);
            if result.changed {
                local.insert(result.value.day.clone(), result.value.clone());
                changed.push(result.value);
            }
        }

        store.save_many(&changed)?;
        Ok(changed.len())
    }

    fn apply_walks(&self, records: &[RemoteRecord]) -> Result<usize> {
        let store = &self.inner.store;
        let mut known: HashMap<Uuid, TrackedWalk> = store
            .load_all::<TrackedWalk>()?
            .into_iter()
            .map(|walk| (walk.id, walk))
            .collect();

        let mut inserted = Vec::new();
        for remote in RecordMapper::from_remote_all::<TrackedWalk>(records) {
            let result = MergeResolver::merge_walk(known.get(&remote.id), &remote);
            if result.changed {
                known.insert(result.value.id, result.value.clone());
                inserted.push(result.value);
            }
        }

        store.save_many(&inserted)?;
        Ok(inserted.len())
    }

    /// Push now, then pull once the push has had time to settle
    pub async fn force_sync(&self) -> Result<()> {
        let pushed = self.push_all().await;
        tokio::time::sleep(self.inner.config.force_pull_delay()).await;
        let pulled = self.pull_all().await;

        pushed?;
        pulled?;
        Ok(())
    }

    /// Manual retry: clears the backoff state and runs a full sync
    pub async fn retry_now(&self) -> Result<()> {
        self.inner.retry.lock().cancel();
        *self.inner.pending_retry.lock() = PendingRetry::default();
        self.inner.retry_attempt.store(0, Ordering::Release);
        self.inner.status.send_modify(|snapshot| {
            snapshot.retry_attempt = 0;
            snapshot.retries_exhausted = false;
        });
        info!("Manual retry requested");
        self.force_sync().await
    }

    /// Quick cold-start check for an existing remote game state
    pub async fn probe(&self) -> Result<bool> {
        self.inner.probe.quick_check().await
    }

    /// Delete the remote namespace; the next cycle provisions it again
    pub async fn reset_remote(&self) -> Result<()> {
        self.inner.remote.delete_namespace().await?;
        self.inner.zone.reset();
        warn!(remote = %self.inner.remote.describe(), "Remote namespace deleted");
        Ok(())
    }

    /// Cancel pending debounce and retry timers. In-flight calls finish.
    pub fn shutdown(&self) {
        self.inner.debounce.lock().cancel();
        self.inner.retry.lock().cancel();
        info!("Sync orchestrator stopped");
    }

    /// Spawn the change listener, plus the periodic pull if configured
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        let mut tasks = vec![self.spawn_change_listener()];
        if let Some(secs) = self.inner.config.pull_interval_secs {
            tasks.push(self.spawn_periodic_pull(Duration::from_secs(secs.max(1))));
        }
        tasks
    }

    /// Schedule a push for every locally-originated change on the notifier
    pub fn spawn_change_listener(&self) -> JoinHandle<()> {
        let mut rx = self.inner.notifier.subscribe();
        let this = self.clone();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) if event.is_pushable_change() => this.schedule_push(),
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "Change listener lagged");
                        this.schedule_push();
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("Change listener stopped");
        })
    }

    /// Pull on a fixed interval; the first pull runs immediately
    pub fn spawn_periodic_pull(&self, period: Duration) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let _ = this.pull_all().await;
            }
        })
    }

    fn begin(&self, direction: SyncDirection) {
        debug!(%direction, "Sync started");
        self.inner
            .status
            .send_modify(|snapshot| snapshot.status = SyncStatus::Syncing);
        self.inner.notifier.publish(SyncEvent::sync_started(direction));
    }

    fn succeed(&self, direction: SyncDirection, changes: usize) {
        let now = Utc::now();
        let outstanding = {
            let mut pending = self.inner.pending_retry.lock();
            *pending.slot(direction) = None;
            pending.outstanding_error()
        };

        match &outstanding {
            None => {
                self.inner.retry.lock().cancel();
                self.inner.retry_attempt.store(0, Ordering::Release);
                self.inner.status.send_modify(|snapshot| {
                    snapshot.status = SyncStatus::Success;
                    snapshot.last_sync = Some(now);
                    snapshot.retry_attempt = 0;
                    snapshot.retries_exhausted = false;
                });
            }
            Some(message) => {
                // The other direction still owes a retry; keep reporting it
                debug!(%direction, "Sync succeeded with a retry still pending");
                self.inner.status.send_modify(|snapshot| {
                    snapshot.status = SyncStatus::Error(message.clone());
                    snapshot.last_sync = Some(now);
                });
            }
        }

        let marker = SyncMarker {
            last_sync: Some(now),
            last_error: outstanding,
        };
        if let Err(e) = self.inner.store.save_sync_marker(&marker) {
            warn!(error = %e, "Failed to persist sync marker");
        }

        self.inner
            .notifier
            .publish(SyncEvent::sync_completed(direction, changes));
    }

    fn fail(&self, direction: SyncDirection, err: &WalkSyncError) {
        let message = err.to_string();
        warn!(
            %direction,
            code = err.code(),
            transient = err.is_retryable(),
            error = %message,
            "Sync failed"
        );

        self.inner
            .status
            .send_modify(|snapshot| snapshot.status = SyncStatus::Error(message.clone()));

        let marker = SyncMarker {
            last_sync: self.inner.status.borrow().last_sync,
            last_error: Some(message.clone()),
        };
        if let Err(e) = self.inner.store.save_sync_marker(&marker) {
            warn!(error = %e, "Failed to persist sync marker");
        }

        self.inner
            .notifier
            .publish(SyncEvent::sync_failed(direction, &message));

        *self.inner.pending_retry.lock().slot(direction) = Some(message);
        self.schedule_retry(direction);
    }

    /// Arm the backoff timer, or join the one already armed. When it fires,
    /// every pending direction runs again.
    fn schedule_retry(&self, direction: SyncDirection) {
        let max = self.inner.config.max_retry_attempts;
        let mut slot = self.inner.retry.lock();
        if slot.is_armed() {
            debug!(%direction, "Joined pending retry");
            return;
        }

        let attempt = self.inner.retry_attempt.load(Ordering::Acquire);
        if attempt >= max {
            slot.cancel();
            drop(slot);
            self.inner
                .status
                .send_modify(|snapshot| snapshot.retries_exhausted = true);
            error!(%direction, attempts = attempt, "Sync retries exhausted; manual retry required");
            return;
        }

        let delay = self.inner.config.retry_delay(attempt);
        self.inner.retry_attempt.store(attempt + 1, Ordering::Release);
        self.inner
            .status
            .send_modify(|snapshot| snapshot.retry_attempt = attempt + 1);

        let this = self.clone();
        slot.arm(move |generation| {
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let claimed = this.inner.retry.lock().claim(generation);
                if !claimed {
                    return;
                }
                let directions = this.inner.pending_retry.lock().directions();
                for direction in directions {
                    debug!(%direction, attempt = attempt + 1, "Retrying sync");
                    // Failures re-arm the timer from inside push_all / pull_all
                    let _ = match direction {
                        SyncDirection::Push => this.push_all().await.map(|_| ()),
                        SyncDirection::Pull => this.pull_all().await.map(|_| ()),
                    };
                }
            })
        });
        drop(slot);
        info!(
            %direction,
            attempt = attempt + 1,
            delay_secs = delay.as_secs(),
            "Sync retry scheduled"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventType;
    use crate::storage::Storage;
    use crate::sync::memory::MemoryRemote;
    use crate::types::{Badge, Profile};
    use chrono::TimeZone;

    struct Device {
        storage: Arc<Storage>,
        sync: SyncOrchestrator<Storage>,
    }

    fn device(remote: &Arc<MemoryRemote>) -> Device {
        let notifier = ChangeNotifier::new();
        let storage = Arc::new(
            Storage::open_in_memory()
                .unwrap()
                .with_notifier(notifier.clone()),
        );
        let sync = SyncOrchestrator::new(
            storage.clone(),
            remote.clone(),
            notifier,
            SyncConfig::for_namespace("user-1"),
        )
        .unwrap();
        Device { storage, sync }
    }

    fn log(day: &str, steps: u32) -> DailyLog {
        DailyLog {
            steps,
            ..DailyLog::new(day)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_bursts_of_changes_coalesce_into_one_push() {
        let remote = Arc::new(MemoryRemote::new("user-1"));
        let device = device(&remote);
        let _listener = device.sync.spawn_change_listener();

        for i in 0..10 {
            device.storage.save(&log("2026-10-19", 100 * (i + 1))).unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(remote.write_calls(), 0);
        assert!(device.sync.has_pending_push());

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(remote.write_calls(), 1);
        assert!(!device.sync.has_pending_push());

        let pushed: DailyLog =
            RecordMapper::from_remote(&remote.get(RecordType::DailyLog, "daily_2026-10-19").unwrap())
                .unwrap();
        assert_eq!(pushed.steps, 1000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_all_cancels_pending_debounce() {
        let remote = Arc::new(MemoryRemote::new("user-1"));
        let device = device(&remote);
        device.storage.save(&log("2026-10-19", 10)).unwrap();

        device.sync.schedule_push();
        let report = device.sync.push_all().await.unwrap().unwrap();
        assert_eq!(report.written, 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(remote.write_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_merge_writes_do_not_trigger_a_push() {
        let remote = Arc::new(MemoryRemote::new("user-1"));
        let other = device(&remote);
        other.storage.save(&log("2026-10-18", 8000)).unwrap();
        other.sync.push_all().await.unwrap();
        let writes_before = remote.write_calls();

        let this = device(&remote);
        let _listener = this.sync.spawn_change_listener();
        let report = this.sync.pull_all().await.unwrap().unwrap();
        assert_eq!(report.merged, 1);
        assert!(!this.sync.is_merging());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(remote.write_calls(), writes_before);
        assert!(!this.sync.has_pending_push());

        let merged: DailyLog = this.storage.load("2026-10-18").unwrap().unwrap();
        assert_eq!(merged.steps, 8000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_push_retries_with_backoff_then_recovers() {
        let remote = Arc::new(MemoryRemote::new("user-1"));
        let device = device(&remote);
        device.storage.save(&log("2026-10-19", 500)).unwrap();
        remote.set_unreachable(true);

        assert!(device.sync.push_all().await.is_err());
        let status = device.sync.status();
        assert!(matches!(status.status, SyncStatus::Error(_)));
        assert_eq!(status.retry_attempt, 1);
        assert!(device.sync.has_pending_retry());

        // First retry after 5s fails again and schedules the 15s one
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(device.sync.status().retry_attempt, 2);

        remote.set_unreachable(false);
        tokio::time::sleep(Duration::from_secs(16)).await;

        let status = device.sync.status();
        assert_eq!(status.status, SyncStatus::Success);
        assert_eq!(status.retry_attempt, 0);
        assert!(status.last_sync.is_some());
        assert_eq!(remote.count_of(RecordType::DailyLog), 1);
        assert!(device.storage.load_sync_marker().unwrap().last_error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_stop_after_ceiling_until_manual_retry() {
        let remote = Arc::new(MemoryRemote::new("user-1"));
        let device = device(&remote);
        device.storage.save(&log("2026-10-19", 500)).unwrap();
        remote.set_unreachable(true);

        assert!(device.sync.push_all().await.is_err());
        // 5s + 15s + 45s
        tokio::time::sleep(Duration::from_secs(70)).await;

        let status = device.sync.status();
        assert!(status.retries_exhausted);
        assert_eq!(status.retry_attempt, 3);
        assert!(!device.sync.has_pending_retry());

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(device.sync.status().retry_attempt, 3);
        assert!(device
            .storage
            .load_sync_marker()
            .unwrap()
            .last_error
            .is_some());

        remote.set_unreachable(false);
        device.sync.retry_now().await.unwrap();
        let status = device.sync.status();
        assert!(!status.retries_exhausted);
        assert_eq!(status.status, SyncStatus::Success);
        assert_eq!(remote.count_of(RecordType::DailyLog), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_during_in_flight_push_is_pushed_afterwards() {
        let remote = Arc::new(MemoryRemote::new("user-1"));
        remote.set_write_latency(Some(Duration::from_secs(5)));
        let device = device(&remote);
        let _listener = device.sync.spawn_change_listener();

        device.storage.save(&log("2026-10-19", 100)).unwrap();
        // Debounce has fired; the first push is waiting on the slow write
        tokio::time::sleep(Duration::from_millis(2100)).await;
        device.storage.save(&log("2026-10-19", 900)).unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;

        let pushed: DailyLog =
            RecordMapper::from_remote(&remote.get(RecordType::DailyLog, "daily_2026-10-19").unwrap())
                .unwrap();
        assert_eq!(pushed.steps, 900);
        assert_eq!(remote.write_calls(), 2);
        assert!(!device.sync.has_pending_push());
        assert_eq!(device.sync.status().status, SyncStatus::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pull_failure_keeps_pending_push_retry() {
        let remote = Arc::new(MemoryRemote::new("user-1"));
        let device = device(&remote);
        device.storage.save(&log("2026-10-19", 500)).unwrap();
        remote.set_unreachable(true);

        assert!(device.sync.push_all().await.is_err());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(device.sync.pull_all().await.is_err());
        // Both failures wait on the same backoff step
        assert_eq!(device.sync.status().retry_attempt, 1);
        assert!(device.sync.has_pending_retry());

        remote.set_unreachable(false);
        tokio::time::sleep(Duration::from_secs(300)).await;

        assert_eq!(remote.count_of(RecordType::DailyLog), 1);
        let status = device.sync.status();
        assert_eq!(status.status, SyncStatus::Success);
        assert_eq!(status.retry_attempt, 0);
        assert!(!device.sync.has_pending_retry());
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_pull_does_not_hide_failed_push() {
        let remote = Arc::new(MemoryRemote::new("user-1"));
        let device = device(&remote);
        device.storage.save(&log("2026-10-19", 500)).unwrap();
        remote.set_unreachable(true);
        assert!(device.sync.push_all().await.is_err());

        remote.set_unreachable(false);
        device.sync.pull_all().await.unwrap();
        assert!(matches!(device.sync.status().status, SyncStatus::Error(_)));
        assert!(device.sync.has_pending_retry());
        assert!(device
            .storage
            .load_sync_marker()
            .unwrap()
            .last_error
            .is_some());

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(remote.count_of(RecordType::DailyLog), 1);
        assert_eq!(device.sync.status().status, SyncStatus::Success);
        assert!(device.storage.load_sync_marker().unwrap().last_error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_force_sync_uses_one_attempt() {
        let remote = Arc::new(MemoryRemote::new("user-1"));
        let device = device(&remote);
        remote.set_unreachable(true);

        assert!(device.sync.force_sync().await.is_err());
        assert_eq!(device.sync.status().retry_attempt, 1);
        device.sync.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_pull_retries_then_recovers() {
        let remote = Arc::new(MemoryRemote::new("user-1"));
        let other = device(&remote);
        other.storage.save(&log("2026-10-16", 4200)).unwrap();
        other.sync.push_all().await.unwrap();

        let this = device(&remote);
        remote.set_unreachable(true);
        assert!(this.sync.pull_all().await.is_err());
        assert!(matches!(this.sync.status().status, SyncStatus::Error(_)));
        assert_eq!(this.sync.status().retry_attempt, 1);
        assert!(this.sync.has_pending_retry());

        remote.set_unreachable(false);
        tokio::time::sleep(Duration::from_secs(6)).await;

        let merged: DailyLog = this.storage.load("2026-10-16").unwrap().unwrap();
        assert_eq!(merged.steps, 4200);
        let status = this.sync.status();
        assert_eq!(status.status, SyncStatus::Success);
        assert_eq!(status.retry_attempt, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_provisioning_failure_sets_error_and_backs_off() {
        let remote = Arc::new(MemoryRemote::new("user-1"));
        let device = device(&remote);
        device.storage.save(&log("2026-10-19", 700)).unwrap();
        remote.fail_provisioning(true);

        let err = device.sync.push_all().await.unwrap_err();
        assert!(matches!(err, WalkSyncError::Provisioning(_)));
        let status = device.sync.status();
        assert!(matches!(status.status, SyncStatus::Error(_)));
        assert_eq!(status.retry_attempt, 1);
        assert!(device.sync.has_pending_retry());
        assert!(!remote.namespace_exists());

        remote.fail_provisioning(false);
        tokio::time::sleep(Duration::from_secs(6)).await;

        assert!(remote.namespace_exists());
        assert_eq!(remote.count_of(RecordType::DailyLog), 1);
        assert_eq!(device.sync.status().status, SyncStatus::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_pull_keeps_merged_types() {
        let remote = Arc::new(MemoryRemote::new("user-1"));
        let other = device(&remote);
        other.storage.save(&log("2026-10-17", 3000)).unwrap();
        other
            .storage
            .save(&TrackedWalk {
                id: Uuid::new_v4(),
                day: "2026-10-17".to_string(),
                started_at: Utc.with_ymd_and_hms(2026, 10, 17, 7, 0, 0).unwrap(),
                ended_at: Utc.with_ymd_and_hms(2026, 10, 17, 7, 30, 0).unwrap(),
                steps: 3000,
                distance_meters: 2100.0,
                active_calories: 140.0,
            })
            .unwrap();
        other.sync.push_all().await.unwrap();

        let this = device(&remote);
        let mut events = this.sync.notifier().subscribe();
        remote.fail_fetch(RecordType::TrackedWalk, 0);

        let err = this.sync.pull_all().await.unwrap_err();
        assert!(matches!(
            err,
            WalkSyncError::PullIncomplete(ref types) if types == &vec![RecordType::TrackedWalk]
        ));
        assert!(this.storage.load::<DailyLog>("2026-10-17").unwrap().is_some());
        assert!(this.storage.load_all::<TrackedWalk>().unwrap().is_empty());

        let mut saw_failure = false;
        while let Ok(event) = events.try_recv() {
            assert_ne!(event.event_type, EventType::SyncCompleted);
            saw_failure |= event.event_type == EventType::SyncFailed;
        }
        assert!(saw_failure);
        this.sync.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_install_adopts_remote_profile() {
        let remote = Arc::new(MemoryRemote::new("user-1"));
        let veteran = device(&remote);
        let mut game = GameState::default();
        game.profile = Profile {
            has_completed_onboarding: true,
            has_seen_first_walk_education: true,
            display_name: "Sam".to_string(),
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            badges: vec![Badge {
                id: "first_walk".to_string(),
                earned_at: Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap(),
            }],
        };
        game.streak.longest_streak = 30;
        veteran.storage.save(&game).unwrap();
        veteran.sync.push_all().await.unwrap();

        let fresh = device(&remote);
        fresh.storage.save(&GameState::default()).unwrap();
        assert!(fresh.sync.probe().await.unwrap());
        fresh.sync.pull_all().await.unwrap();

        let merged: GameState = fresh.storage.load(GAME_STATE_KEY).unwrap().unwrap();
        assert_eq!(merged.profile, game.profile);
        assert_eq!(merged.streak.longest_streak, 30);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_sync_round_trip() {
        let remote = Arc::new(MemoryRemote::new("user-1"));
        let device = device(&remote);
        device.storage.save(&log("2026-10-19", 1200)).unwrap();

        let mut status = device.sync.subscribe_status();
        device.sync.force_sync().await.unwrap();

        assert!(status.has_changed().unwrap());
        assert_eq!(status.borrow_and_update().status, SyncStatus::Success);
        assert!(remote.provision_calls() >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_remote_reprovisions() {
        let remote = Arc::new(MemoryRemote::new("user-1"));
        let device = device(&remote);
        device.storage.save(&log("2026-10-19", 1200)).unwrap();
        device.sync.push_all().await.unwrap();

        device.sync.reset_remote().await.unwrap();
        assert!(!remote.namespace_exists());
        assert!(!device.sync.probe().await.unwrap_or(false));

        device.sync.push_all().await.unwrap();
        assert!(remote.namespace_exists());
        assert_eq!(remote.count_of(RecordType::DailyLog), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_runs_periodic_pulls() {
        let remote = Arc::new(MemoryRemote::new("user-1"));
        let other = device(&remote);
        other.storage.save(&log("2026-10-19", 900)).unwrap();
        other.sync.push_all().await.unwrap();

        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let config = SyncConfig {
            pull_interval_secs: Some(60),
            ..SyncConfig::for_namespace("user-1")
        };
        let sync =
            SyncOrchestrator::new(storage.clone(), remote.clone(), ChangeNotifier::new(), config)
                .unwrap();
        let tasks = sync.start();
        assert_eq!(tasks.len(), 2);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(storage.load::<DailyLog>("2026-10-19").unwrap().is_some());

        other.storage.save(&log("2026-10-20", 300)).unwrap();
        other.sync.push_all().await.unwrap();
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(storage.load::<DailyLog>("2026-10-20").unwrap().is_some());

        for task in tasks {
            task.abort();
        }
    }

    #[test]
    fn test_in_flight_guard_is_exclusive() {
        let flag = AtomicBool::new(false);
        let first = InFlight::acquire(&flag);
        assert!(first.is_some());
        assert!(InFlight::acquire(&flag).is_none());
        drop(first);
        assert!(InFlight::acquire(&flag).is_some());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let remote = Arc::new(MemoryRemote::new("user-1"));
        let config = SyncConfig {
            max_batch_size: 0,
            ..SyncConfig::default()
        };
        let result = SyncOrchestrator::new(
            Arc::new(Storage::open_in_memory().unwrap()),
            remote,
            ChangeNotifier::new(),
            config,
        );
        assert!(matches!(result, Err(WalkSyncError::Config(_))));
    }
}

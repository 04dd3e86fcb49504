//! Core types for walksync

use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, WalkSyncError};
use crate::sync::RecordType;

/// Storage key of the per-user game state singleton
pub const GAME_STATE_KEY: &str = "game_state";

/// Format of a calendar day key (e.g. "2026-10-19")
pub const DAY_KEY_FORMAT: &str = "%Y-%m-%d";

/// A locally persisted, independently versioned entity
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Remote record type this entity maps to
    const RECORD_TYPE: RecordType;

    /// Stable identity of this entity within its type
    fn key(&self) -> String;
}

/// Streak progress
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakState {
    #[serde(default)]
    pub current_streak: u32,
    /// Lifetime best, never decreases once synced
    #[serde(default)]
    pub longest_streak: u32,
    pub last_goal_met_date: Option<DateTime<Utc>>,
    pub streak_start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub consecutive_goal_days: u32,
}

/// Streak protection credits
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShieldState {
    /// Spendable balance; may legitimately go down
    #[serde(default)]
    pub available_shields: u32,
    #[serde(default)]
    pub purchased_shields: u32,
    #[serde(default)]
    pub shields_used_this_month: u32,
    #[serde(default)]
    pub total_shields_used: u32,
    pub last_refill_date: Option<DateTime<Utc>>,
}

/// A legacy achievement badge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Badge {
    pub id: String,
    pub earned_at: DateTime<Utc>,
}

/// User profile and onboarding flags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub has_completed_onboarding: bool,
    #[serde(default)]
    pub has_seen_first_walk_education: bool,
    #[serde(default)]
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub badges: Vec<Badge>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            has_completed_onboarding: false,
            has_seen_first_walk_education: false,
            display_name: String::new(),
            created_at: Utc::now(),
            badges: Vec::new(),
        }
    }
}

impl Profile {
    /// True when nothing user-provided has been recorded yet (fresh install)
    pub fn is_fresh_install(&self) -> bool {
        !self.has_completed_onboarding && self.display_name.is_empty() && self.badges.is_empty()
    }
}

/// Per-user game state singleton
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    #[serde(default)]
    pub streak: StreakState,
    #[serde(default)]
    pub shields: ShieldState,
    #[serde(default)]
    pub profile: Profile,
}

impl Entity for GameState {
    const RECORD_TYPE: RecordType = RecordType::GameState;

    fn key(&self) -> String {
        GAME_STATE_KEY.to_string()
    }
}

/// Activity for one calendar day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyLog {
    /// Day key, formatted with [`DAY_KEY_FORMAT`]
    pub day: String,
    #[serde(default)]
    pub steps: u32,
    #[serde(default)]
    pub goal_met: bool,
    #[serde(default)]
    pub shield_used: bool,
    #[serde(default)]
    pub tracked_walk_ids: Vec<Uuid>,
}

impl DailyLog {
    /// Create an empty log for a day
    pub fn new(day: impl Into<String>) -> Self {
        Self {
            day: day.into(),
            steps: 0,
            goal_met: false,
            shield_used: false,
            tracked_walk_ids: Vec::new(),
        }
    }
}

impl Entity for DailyLog {
    const RECORD_TYPE: RecordType = RecordType::DailyLog;

    fn key(&self) -> String {
        self.day.clone()
    }
}

/// A recorded walk; immutable once created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedWalk {
    pub id: Uuid,
    /// Day key the walk is attributed to
    pub day: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    #[serde(default)]
    pub steps: u32,
    #[serde(default)]
    pub distance_meters: f64,
    #[serde(default)]
    pub active_calories: f64,
}

impl Entity for TrackedWalk {
    const RECORD_TYPE: RecordType = RecordType::TrackedWalk;

    fn key(&self) -> String {
        self.id.to_string()
    }
}

/// Parse and validate a day key
pub fn parse_day_key(day: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(day, DAY_KEY_FORMAT)
        .map_err(|e| WalkSyncError::InvalidInput(format!("bad day key '{}': {}", day, e)))
}

/// Day key for a date
pub fn day_key(date: NaiveDate) -> String {
    date.format(DAY_KEY_FORMAT).to_string()
}

/// Sync status as seen by the presentation layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "message")]
pub enum SyncStatus {
    #[default]
    Idle,
    Syncing,
    Success,
    Error(String),
}

/// Observable sync state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSnapshot {
    pub status: SyncStatus,
    pub last_sync: Option<DateTime<Utc>>,
    /// Number of automatic retries already scheduled since the last success
    pub retry_attempt: u32,
    /// Automatic retries gave up; only a manual retry restarts syncing
    pub retries_exhausted: bool,
}

/// Last sync outcome persisted next to local data
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMarker {
    pub last_sync: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Sync engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// User-scoped remote namespace
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Quiet period before a scheduled push fires
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Maximum records per remote write request
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    /// First retry delay
    #[serde(default = "default_retry_base_secs")]
    pub retry_base_secs: u64,
    /// Growth factor between retry delays
    #[serde(default = "default_retry_multiplier")]
    pub retry_multiplier: u32,
    /// Automatic retries before giving up
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    /// Delay between push and pull in a forced sync
    #[serde(default = "default_force_pull_delay_ms")]
    pub force_pull_delay_ms: u64,
    /// Upper bound on the existence probe
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Pages read per record type before a pull is aborted
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
    /// Periodic pull interval, if any
    #[serde(default)]
    pub pull_interval_secs: Option<u64>,
}

fn default_namespace() -> String {
    "walksync-default".to_string()
}

fn default_debounce_ms() -> u64 {
    2000
}

fn default_max_batch_size() -> usize {
    400
}

fn default_retry_base_secs() -> u64 {
    5
}

fn default_retry_multiplier() -> u32 {
    3
}

fn default_max_retry_attempts() -> u32 {
    3
}

fn default_force_pull_delay_ms() -> u64 {
    1500
}

fn default_probe_timeout_ms() -> u64 {
    5000
}

fn default_max_pages() -> usize {
    10_000
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            debounce_ms: default_debounce_ms(),
            max_batch_size: default_max_batch_size(),
            retry_base_secs: default_retry_base_secs(),
            retry_multiplier: default_retry_multiplier(),
            max_retry_attempts: default_max_retry_attempts(),
            force_pull_delay_ms: default_force_pull_delay_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            max_pages: default_max_pages(),
            pull_interval_secs: None,
        }
    }
}

impl SyncConfig {
    /// Config for a given user namespace, defaults elsewhere
    pub fn for_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.namespace.trim().is_empty() {
            return Err(WalkSyncError::Config("namespace must not be empty".into()));
        }
        if self.max_batch_size == 0 {
            return Err(WalkSyncError::Config("max_batch_size must be > 0".into()));
        }
        if self.retry_multiplier == 0 {
            return Err(WalkSyncError::Config("retry_multiplier must be > 0".into()));
        }
        if self.max_pages == 0 {
            return Err(WalkSyncError::Config("max_pages must be > 0".into()));
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn force_pull_delay(&self) -> Duration {
        Duration::from_millis(self.force_pull_delay_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Delay before retry number `attempt` (0-based): base * multiplier^attempt
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = u64::from(self.retry_multiplier).saturating_pow(attempt);
        Duration::from_secs(self.retry_base_secs.saturating_mul(factor))
    }
}

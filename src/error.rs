//! Error types for walksync

use std::time::Duration;

use thiserror::Error;

use crate::sync::RecordType;

/// Result type alias for walksync operations
pub type Result<T> = std::result::Result<T, WalkSyncError>;

/// Main error type for walksync
#[derive(Error, Debug)]
pub enum WalkSyncError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Record could not be encoded: {0}")]
    Encoding(String),

    #[error("Namespace could not be provisioned: {0}")]
    Provisioning(String),

    #[error("Namespace already exists: {0}")]
    NamespaceExists(String),

    #[error("Namespace not found: {0}")]
    ZoneNotFound(String),

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Remote store error: {0}")]
    Remote(String),

    #[error("Batch of {actual} records exceeds the limit of {limit}")]
    LimitExceeded { limit: usize, actual: usize },

    #[error("Batch write failed for chunk(s) {failed:?} of {total}: {message}")]
    BatchWrite {
        failed: Vec<usize>,
        total: usize,
        message: String,
    },

    #[error("Fetch of {record_type} records failed: {message}")]
    Fetch {
        record_type: RecordType,
        message: String,
    },

    #[error("Pull incomplete, failed record types: {0:?}")]
    PullIncomplete(Vec<RecordType>),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WalkSyncError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WalkSyncError::Remote(_)
                | WalkSyncError::Provisioning(_)
                | WalkSyncError::BatchWrite { .. }
                | WalkSyncError::Fetch { .. }
                | WalkSyncError::PullIncomplete(_)
                | WalkSyncError::Timeout(_)
                | WalkSyncError::Io(_)
        )
    }

    /// "No remote data yet", as opposed to a transport or auth failure
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            WalkSyncError::RecordNotFound(_) | WalkSyncError::ZoneNotFound(_)
        )
    }

    /// Stable error code for status reporting
    pub fn code(&self) -> &'static str {
        match self {
            WalkSyncError::Database(_) => "database",
            WalkSyncError::Serialization(_) | WalkSyncError::Encoding(_) => "encoding",
            WalkSyncError::Io(_) => "io",
            WalkSyncError::InvalidInput(_) => "invalid_input",
            WalkSyncError::Config(_) => "config",
            WalkSyncError::Provisioning(_) => "provisioning",
            WalkSyncError::NamespaceExists(_) => "namespace_exists",
            WalkSyncError::ZoneNotFound(_) => "zone_not_found",
            WalkSyncError::RecordNotFound(_) => "not_found",
            WalkSyncError::Remote(_) => "remote",
            WalkSyncError::LimitExceeded { .. } => "limit_exceeded",
            WalkSyncError::BatchWrite { .. } => "batch_write",
            WalkSyncError::Fetch { .. } => "fetch",
            WalkSyncError::PullIncomplete(_) => "pull_incomplete",
            WalkSyncError::Timeout(_) => "timeout",
            WalkSyncError::Internal(_) => "internal",
        }
    }
}

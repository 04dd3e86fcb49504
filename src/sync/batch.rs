//! Bounded, non-atomic batch writes

use std::sync::Arc;

use tracing::{debug, warn};

use super::record::RemoteRecord;
use super::remote::RemoteStore;
use crate::error::{Result, WalkSyncError};

/// Outcome of a fully successful write
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Records submitted
    pub written: usize,
    /// Chunks submitted
    pub chunks: usize,
}

/// Splits outgoing records into chunks no larger than the remote limit
pub struct BatchedWriter {
    remote: Arc<dyn RemoteStore>,
    max_batch_size: usize,
}

impl BatchedWriter {
    pub fn new(remote: Arc<dyn RemoteStore>, max_batch_size: usize) -> Self {
        Self {
            remote,
            max_batch_size: max_batch_size.max(1),
        }
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// Write every record. Each chunk is submitted on its own: a failed chunk
    /// neither rolls back nor blocks the others, and the error lists the
    /// 1-based numbers of the chunks that failed.
    pub async fn write(&self, records: Vec<RemoteRecord>) -> Result<BatchReport> {
        if records.is_empty() {
            return Ok(BatchReport::default());
        }

        let chunks: Vec<Vec<RemoteRecord>> = records
            .chunks(self.max_batch_size)
            .map(|chunk| chunk.to_vec())
            .collect();
        let total = chunks.len();

        let mut written = 0;
        let mut failed = Vec::new();
        let mut messages = Vec::new();

        for (index, chunk) in chunks.into_iter().enumerate() {
            let number = index + 1;
            let size = chunk.len();
            match self.remote.write_batch(chunk, false).await {
                Ok(()) => {
                    written += size;
                    debug!(chunk = number, total, size, "Wrote chunk");
                }
                Err(e) => {
                    warn!(chunk = number, total, size, error = %e, "Chunk write failed");
                    failed.push(number);
                    messages.push(format!("chunk {}: {}", number, e));
                }
            }
        }

        if failed.is_empty() {
            Ok(BatchReport {
                written,
                chunks: total,
            })
        } else {
            Err(WalkSyncError::BatchWrite {
                failed,
                total,
                message: messages.join("; "),
            })
        }
    }
}

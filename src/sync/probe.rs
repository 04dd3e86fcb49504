//! Cold-start check for existing remote data

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::record::RecordType;
use super::remote::RemoteStore;
use crate::error::{Result, WalkSyncError};
use crate::types::GAME_STATE_KEY;

/// Routes first launch between "new user" and "returning user" without a full pull
pub struct ExistenceProbe {
    remote: Arc<dyn RemoteStore>,
    timeout: Duration,
}

impl ExistenceProbe {
    pub fn new(remote: Arc<dyn RemoteStore>, timeout: Duration) -> Self {
        Self { remote, timeout }
    }

    /// `Ok(true)` if the game state record exists remotely, `Ok(false)` on a
    /// definitive not-found. Transport failures and timeouts are errors, never
    /// `false`.
    pub async fn quick_check(&self) -> Result<bool> {
        let fetch = self.remote.fetch_single(RecordType::GameState, GAME_STATE_KEY);
        match tokio::time::timeout(self.timeout, fetch).await {
            Err(_) => Err(WalkSyncError::Timeout(self.timeout)),
            Ok(Ok(_)) => Ok(true),
            Ok(Err(e)) if e.is_not_found() => {
                debug!(reason = %e, "No remote game state");
                Ok(false)
            }
            Ok(Err(e)) => Err(e),
        }
    }
}

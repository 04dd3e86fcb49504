//! User-scoped namespace provisioning

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use super::remote::RemoteStore;
use crate::error::{Result, WalkSyncError};

/// Ensures the remote namespace exists before any read or write.
///
/// Success is remembered for the lifetime of the provisioner, so the remote is
/// asked at most once per process unless [`ZoneProvisioner::reset`] is called.
pub struct ZoneProvisioner {
    remote: Arc<dyn RemoteStore>,
    ready: AtomicBool,
    lock: Mutex<()>,
}

impl ZoneProvisioner {
    pub fn new(remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            remote,
            ready: AtomicBool::new(false),
            lock: Mutex::new(()),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Create the namespace if needed. An existing namespace counts as success.
    pub async fn ensure(&self) -> Result<()> {
        if self.is_ready() {
            return Ok(());
        }

        // Concurrent callers wait for the first attempt instead of racing it
        let _guard = self.lock.lock().await;
        if self.is_ready() {
            return Ok(());
        }

        match self.remote.ensure_namespace().await {
            Ok(()) => info!(remote = %self.remote.describe(), "Namespace created"),
            Err(WalkSyncError::NamespaceExists(_)) => {
                debug!(remote = %self.remote.describe(), "Namespace already present")
            }
            Err(e @ WalkSyncError::Provisioning(_)) => return Err(e),
            Err(e) => return Err(WalkSyncError::Provisioning(e.to_string())),
        }

        self.ready.store(true, Ordering::Release);
        Ok(())
    }

    /// Forget the memo, e.g. after the namespace was deleted
    pub fn reset(&self) {
        self.ready.store(false, Ordering::Release);
    }
}

//! Scoped release of an acquired agent handle.

use crate::runtime::AgentHandle;
use crate::workspace::WorkspaceLock;
use std::sync::Arc;
use std::time::Duration;

/// RAII guard over an acquired agent.
///
/// The normal path is the explicit async [`ReleaseGuard::release`]. If the
/// guard is dropped without it (the owning future was cancelled or panicked),
/// `Drop` schedules the same teardown on the ambient runtime. Either way the
/// handle is released exactly once, and the workspace lock (if any) is only
/// given up after that.
pub(crate) struct ReleaseGuard {
    handle: Option<Arc<dyn AgentHandle>>,
    lock: Option<WorkspaceLock>,
    grace: Duration,
}

impl ReleaseGuard {
    pub(crate) fn new(handle: Arc<dyn AgentHandle>, grace: Duration) -> Self {
        Self {
            handle: Some(handle),
            lock: None,
            grace,
        }
    }

    /// Hold `lock` until the agent has been torn down.
    pub(crate) fn with_lock(mut self, lock: WorkspaceLock) -> Self {
        self.lock = Some(lock);
        self
    }

    /// Tear down the agent, waiting at most the grace period.
    pub(crate) async fn release(mut self) {
        if let Some(handle) = self.handle.take() {
            teardown(handle, self.lock.take(), self.grace).await;
        }
    }
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                tracing::warn!("Run abandoned before release; releasing agent in background");
                rt.spawn(teardown(handle, self.lock.take(), self.grace));
            }
            Err(_) => {
                tracing::error!("No async runtime left to release agent resources");
            }
        }
    }
}

/// Release errors are logged and swallowed; they never change a run's outcome.
async fn teardown(handle: Arc<dyn AgentHandle>, lock: Option<WorkspaceLock>, grace: Duration) {
    match tokio::time::timeout(grace, handle.release()).await {
        Ok(Ok(())) => tracing::debug!("Agent resources released"),
        Ok(Err(e)) => tracing::warn!("Agent release failed: {}", e),
        Err(_) => tracing::warn!("Agent release exceeded {:?} grace period; continuing", grace),
    }
    if let Some(lock) = lock {
        if let Err(e) = lock.release() {
            tracing::warn!("Failed to remove run lock: {}", e);
        }
    }
}

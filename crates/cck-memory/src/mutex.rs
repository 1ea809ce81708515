use std::sync::Arc;
use std::time::Duration;

use cck_domain::{MemoryScope, MemoryService, OpError, OpResult};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Delay between acquisition attempts while the lock is held elsewhere.
const ACQUIRE_BACKOFF: Duration = Duration::from_millis(100);

// ── ScopedMutex ───────────────────────────────────────────────────────────────

/// Distributed mutex over the memory service's lock primitives.
///
/// The TTL applies to the whole memory scope, so each mutex must live in a
/// scope of its own. The lock token exists only in the acquirer's memory;
/// it is never persisted beyond the backend's lock cell.
#[derive(Clone)]
pub struct ScopedMutex {
    memory: Arc<dyn MemoryService>,
    scope: MemoryScope,
    name: String,
    ttl: Duration,
}

impl ScopedMutex {
    pub fn new(
        memory: Arc<dyn MemoryService>,
        scope: MemoryScope,
        name: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        ScopedMutex { memory, scope, name: name.into(), ttl }
    }

    /// Single acquisition attempt; `Ok(None)` when the lock is held
    /// elsewhere.
    pub async fn try_acquire(&self) -> OpResult<Option<ScopedMutexGuard>> {
        let lock_id = self.memory.mutex_lock(&self.scope, &self.name, self.ttl).await?;
        Ok(lock_id.map(|lock_id| self.guard(lock_id)))
    }

    /// Acquire, retrying with a fixed backoff until `cancel` fires. A
    /// backend error surfaces immediately instead of retrying.
    pub async fn acquire(&self, cancel: &CancellationToken) -> OpResult<ScopedMutexGuard> {
        loop {
            if let Some(lock_id) = self.memory.mutex_lock(&self.scope, &self.name, self.ttl).await?
            {
                return Ok(self.guard(lock_id));
            }
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(OpError::unavailable("mutex acquisition cancelled"));
                }
                _ = tokio::time::sleep(ACQUIRE_BACKOFF) => {}
            }
        }
    }

    fn guard(&self, lock_id: String) -> ScopedMutexGuard {
        ScopedMutexGuard {
            memory: self.memory.clone(),
            scope: self.scope.clone(),
            name: self.name.clone(),
            lock_id: Some(lock_id),
        }
    }
}

// ── Guard ─────────────────────────────────────────────────────────────────────

/// Holds the lock until released or dropped.
///
/// Dropping the guard spawns a best-effort unlock; a failed release is
/// logged and left to self-heal when the TTL elapses. Call
/// [`release`](Self::release) to observe unlock errors.
pub struct ScopedMutexGuard {
    memory: Arc<dyn MemoryService>,
    scope: MemoryScope,
    name: String,
    lock_id: Option<String>,
}

impl std::fmt::Debug for ScopedMutexGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedMutexGuard")
            .field("name", &self.name)
            .field("lock_id", &self.lock_id)
            .finish()
    }
}

impl ScopedMutexGuard {
    pub fn lock_id(&self) -> Option<&str> {
        self.lock_id.as_deref()
    }

    /// Explicit release. `Ok(false)` means the stored token no longer
    /// matched (e.g. the TTL elapsed and another holder took over).
    pub async fn release(mut self) -> OpResult<bool> {
        match self.lock_id.take() {
            Some(lock_id) => self.memory.mutex_unlock(&self.scope, &self.name, &lock_id).await,
            None => Ok(false),
        }
    }
}

impl Drop for ScopedMutexGuard {
    fn drop(&mut self) {
        let Some(lock_id) = self.lock_id.take() else {
            return;
        };
        let memory = self.memory.clone();
        let scope = self.scope.clone();
        let name = self.name.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = memory.mutex_unlock(&scope, &name, &lock_id).await {
                        warn!(%err, mutex = %name, "mutex release failed; ttl will reclaim it");
                    }
                });
            }
            Err(_) => {
                warn!(mutex = %name, "mutex guard dropped outside a runtime; ttl will reclaim it");
            }
        }
    }
}

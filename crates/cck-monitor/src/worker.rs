use std::sync::{Arc, Mutex};
use std::time::Duration;

use cck_domain::{
    EventNotificationConfig, FileService, MemoryScope, MemoryService, OpError, OpResult,
    PubSubService, MONITOR_DISPATCH_SCOPE,
};
use cck_memory::ScopedMutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::registry::NotificationRegistry;
use crate::scan;
use crate::snapshot::SnapshotStore;

/// Mutex name under [`MONITOR_DISPATCH_SCOPE`] guarding scan dispatch.
const DISPATCH_MUTEX_NAME: &str = "lock";

/// Called with every scan-pass failure, in addition to logging.
pub type MonitorErrorCallback = Arc<dyn Fn(&OpError) + Send + Sync>;

// ── Configuration ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Sleep between scan passes.
    pub scan_interval: Duration,
    /// Sleep after a failed pass before the next attempt.
    pub failure_retry_delay: Duration,
    /// Consecutive failures tolerated before the worker terminates.
    pub max_consecutive_failures: u32,
    /// TTL of the dispatch mutex; an abandoned lock self-heals after this.
    pub mutex_ttl: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            scan_interval: Duration::from_secs(3),
            failure_retry_delay: Duration::from_secs(1),
            max_consecutive_failures: 10,
            mutex_ttl: Duration::from_secs(300),
        }
    }
}

// ── FileMonitor ───────────────────────────────────────────────────────────────

/// Synthesizes upload/delete notifications for object stores without native
/// event hooks.
///
/// Clients register [`EventNotificationConfig`]s; a single long-lived
/// worker per instance periodically lists files, diffs them against the
/// persisted per-bucket baseline and publishes matching events. Processes
/// sharing a memory realm elect one dispatcher per cycle through a
/// distributed mutex, so events are not duplicated.
pub struct FileMonitor {
    pubsub: Arc<dyn PubSubService>,
    config: MonitorConfig,
    registry: NotificationRegistry,
    snapshots: SnapshotStore,
    dispatch_mutex: ScopedMutex,
    shutdown: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl FileMonitor {
    pub fn new(memory: Arc<dyn MemoryService>, pubsub: Arc<dyn PubSubService>) -> Self {
        Self::with_config(memory, pubsub, MonitorConfig::default())
    }

    pub fn with_config(
        memory: Arc<dyn MemoryService>,
        pubsub: Arc<dyn PubSubService>,
        config: MonitorConfig,
    ) -> Self {
        let dispatch_mutex = ScopedMutex::new(
            memory.clone(),
            MemoryScope::new(MONITOR_DISPATCH_SCOPE),
            DISPATCH_MUTEX_NAME,
            config.mutex_ttl,
        );
        FileMonitor {
            pubsub,
            config,
            registry: NotificationRegistry::new(memory.clone()),
            snapshots: SnapshotStore::new(memory),
            dispatch_mutex,
            shutdown: CancellationToken::new(),
            worker: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &NotificationRegistry {
        &self.registry
    }

    // ── Registration ──────────────────────────────────────────────────────

    /// Register a config (idempotent by value) and mark its topic as wired
    /// to bucket events.
    pub async fn create_notification(&self, config: &EventNotificationConfig) -> OpResult<()> {
        let inserted = self.registry.insert(config).await?;
        self.pubsub.mark_used_on_bucket_event(&config.topic_name).await?;
        debug!(
            bucket = %config.bucket_name,
            topic = %config.topic_name,
            inserted,
            "notification config registered"
        );
        Ok(())
    }

    /// Remove configs for the bucket (optionally one topic); unmarks the
    /// topic per removed config. Returns the number removed.
    pub async fn delete_notifications(
        &self,
        bucket: &str,
        topic: Option<&str>,
    ) -> OpResult<u64> {
        let removed = self.registry.remove(bucket, topic).await?;
        for config in &removed {
            self.pubsub.unmark_used_on_bucket_event(&config.topic_name).await?;
        }
        Ok(removed.len() as u64)
    }

    /// Empty the bucket's baseline under the dispatch mutex. Registered
    /// configs are left in place.
    pub async fn cleanup_bucket(&self, bucket: &str) -> OpResult<()> {
        let guard = self.dispatch_mutex.acquire(&self.shutdown).await?;
        let cleared = self.snapshots.clear(bucket).await;
        let released = guard.release().await;
        cleared?;
        released?;
        Ok(())
    }

    // ── Scanning ──────────────────────────────────────────────────────────

    /// One guarded scan pass. `Ok(false)` means the dispatch mutex was held
    /// elsewhere and this cycle was skipped.
    pub async fn scan_once(&self, files: &Arc<dyn FileService>) -> OpResult<bool> {
        let Some(guard) = self.dispatch_mutex.try_acquire().await? else {
            return Ok(false);
        };
        let scanned = self.scan_all(files).await;
        let released = guard.release().await;
        scanned?;
        if let Err(err) = released {
            warn!(%err, "dispatch mutex release failed; ttl will reclaim it");
        }
        Ok(true)
    }

    async fn scan_all(&self, files: &Arc<dyn FileService>) -> OpResult<()> {
        let loaded = self.registry.load().await?;
        for (bucket, configs) in &loaded.by_bucket {
            let previous = self.snapshots.load(bucket).await?;
            let (current, _stats) =
                scan::scan_bucket(files, &self.pubsub, bucket, configs, &previous).await?;
            self.snapshots.apply(bucket, &previous, &current).await?;
        }
        if !loaded.malformed.is_empty() {
            warn!(count = loaded.malformed.len(), "dropping malformed notification configs");
            self.registry.remove_raw(&loaded.malformed).await?;
        }
        Ok(())
    }

    // ── Worker lifecycle ──────────────────────────────────────────────────

    /// Spawn the worker if it is not already running. The worker holds only
    /// a weak handle to the file service, so the service's lifetime is not
    /// extended by its own monitor.
    pub fn start(
        self: &Arc<Self>,
        files: &Arc<dyn FileService>,
        on_error: Option<MonitorErrorCallback>,
    ) {
        let mut slot = self.worker.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.as_ref().map_or(false, |handle| !handle.is_finished()) {
            return;
        }
        let monitor = self.clone();
        let files = Arc::downgrade(files);
        let cancel = self.shutdown.clone();
        *slot = Some(tokio::spawn(async move {
            run_worker(monitor, files, cancel, on_error).await;
        }));
    }

    /// Cancel the worker and wait for it to stop.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handle = {
            let mut slot = self.worker.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            slot.take()
        };
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

async fn run_worker(
    monitor: Arc<FileMonitor>,
    files: std::sync::Weak<dyn FileService>,
    cancel: CancellationToken,
    on_error: Option<MonitorErrorCallback>,
) {
    info!("file monitor worker started");
    let mut consecutive_failures = 0u32;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(monitor.config.scan_interval) => {}
        }
        let Some(files) = files.upgrade() else {
            debug!("file service dropped; stopping worker");
            break;
        };
        match monitor.scan_once(&files).await {
            Ok(dispatched) => {
                consecutive_failures = 0;
                if !dispatched {
                    debug!("scan skipped; dispatch mutex held by another process");
                }
            }
            Err(err) => {
                consecutive_failures += 1;
                warn!(%err, consecutive_failures, "scan pass failed");
                if let Some(on_error) = &on_error {
                    on_error(&err);
                }
                if consecutive_failures >= monitor.config.max_consecutive_failures {
                    error!(
                        failures = consecutive_failures,
                        "file monitor worker terminating after repeated failures"
                    );
                    break;
                }
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(monitor.config.failure_retry_delay) => {}
                }
            }
        }
    }
    info!("file monitor worker stopped");
}

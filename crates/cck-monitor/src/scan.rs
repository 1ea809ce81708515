use std::collections::HashMap;
use std::sync::Arc;

use cck_domain::{
    BucketEventMessage, EventNotificationConfig, FileEvent, FileService, FileState, ListOptions,
    OpError, OpResult, PubSubService,
};
use chrono::Utc;
use tokio::task::JoinSet;
use tracing::debug;

/// Counters for one bucket's scan, used for logging and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScanStats {
    pub files_seen: usize,
    pub events_published: usize,
}

/// One differential pass over a single bucket: list, diff against the
/// persisted baseline, publish matching events, and hand back the observed
/// states for snapshot persistence.
///
/// Any listing, metadata or publish failure aborts the pass; the caller's
/// retry wrapper owns recovery.
pub(crate) async fn scan_bucket(
    files: &Arc<dyn FileService>,
    pubsub: &Arc<dyn PubSubService>,
    bucket: &str,
    configs: &[EventNotificationConfig],
    previous: &HashMap<String, FileState>,
) -> OpResult<(HashMap<String, FileState>, ScanStats)> {
    let mut stats = ScanStats::default();

    // Enumerate every key, following continuation tokens until exhausted.
    let mut keys = Vec::new();
    let mut continuation_token = None;
    loop {
        let listing = files
            .list_files(
                bucket,
                ListOptions { continuation_token: continuation_token.take(), ..Default::default() },
            )
            .await?;
        keys.extend(listing.file_keys);
        match listing.next_continuation_token {
            Some(token) => continuation_token = Some(token),
            None => break,
        }
    }
    stats.files_seen = keys.len();

    // Fetch current metadata concurrently and assemble the observed states.
    let mut fetches = JoinSet::new();
    for key in keys {
        let files = files.clone();
        let bucket = bucket.to_string();
        fetches.spawn(async move {
            let metadata = files.file_metadata(&bucket, &key).await;
            (key, metadata)
        });
    }
    let mut current: HashMap<String, FileState> = HashMap::new();
    while let Some(joined) = fetches.join_next().await {
        let (key, metadata) =
            joined.map_err(|err| OpError::internal(format!("metadata fetch task: {err}")))?;
        let metadata = metadata?;
        current.insert(
            key.clone(),
            FileState {
                file_key: key,
                last_modified: metadata.last_modified,
                size: metadata.size,
                exists: true,
            },
        );
    }

    // Group configs by prefix, then emit per config and subscribed event.
    let mut by_prefix: HashMap<&str, Vec<&EventNotificationConfig>> = HashMap::new();
    for config in configs {
        by_prefix.entry(config.path_prefix.as_str()).or_default().push(config);
    }

    for (prefix, prefix_configs) in by_prefix {
        for config in prefix_configs {
            for event in &config.event_types {
                match event {
                    FileEvent::Uploaded => {
                        for (key, state) in &current {
                            if !key.starts_with(prefix) {
                                continue;
                            }
                            // New, or content changed (exists is irrelevant
                            // for modification detection).
                            let changed = previous
                                .get(key)
                                .map_or(true, |prev| !prev.same_as(state, false));
                            if changed {
                                publish_event(pubsub, config, bucket, state, FileEvent::Uploaded)
                                    .await?;
                                stats.events_published += 1;
                            }
                        }
                    }
                    FileEvent::Deleted => {
                        for (key, prev) in previous {
                            if key.starts_with(prefix)
                                && prev.exists
                                && !current.contains_key(key)
                            {
                                publish_event(pubsub, config, bucket, prev, FileEvent::Deleted)
                                    .await?;
                                stats.events_published += 1;
                            }
                        }
                    }
                }
            }
        }
    }

    debug!(
        bucket,
        files = stats.files_seen,
        events = stats.events_published,
        "bucket scan complete"
    );
    Ok((current, stats))
}

async fn publish_event(
    pubsub: &Arc<dyn PubSubService>,
    config: &EventNotificationConfig,
    bucket: &str,
    state: &FileState,
    event: FileEvent,
) -> OpResult<()> {
    let message = BucketEventMessage {
        bucket: bucket.to_string(),
        key: state.file_key.clone(),
        event_type: event,
        timestamp: Utc::now(),
        size: (event == FileEvent::Uploaded).then_some(state.size),
        last_modified: match event {
            FileEvent::Uploaded => state.last_modified,
            FileEvent::Deleted => None,
        },
    };
    let body = serde_json::to_string(&message)
        .map_err(|err| OpError::internal(format!("serialize event message: {err}")))?;
    pubsub.publish(&config.topic_name, &body).await
}

use std::collections::HashMap;
use std::sync::Arc;

use cck_domain::{
    EventNotificationConfig, MemoryScope, MemoryService, OpResult, Primitive, MONITOR_SCOPE,
};
use tracing::debug;

/// List under [`MONITOR_SCOPE`] holding the serialized configs.
pub const CONFIG_LIST: &str = "notification_events";

/// Registry contents after a load: parseable configs grouped by bucket plus
/// the raw entries that failed to deserialize (kept for opportunistic GC).
#[derive(Debug, Default)]
pub struct LoadedConfigs {
    pub by_bucket: HashMap<String, Vec<EventNotificationConfig>>,
    pub malformed: Vec<Primitive>,
}

// ── NotificationRegistry ──────────────────────────────────────────────────────

/// The persisted set of `(bucket, topic, prefix, events)` notification
/// configs, stored as serialized values in a memory-service list so that
/// every process sharing the memory realm sees the same registrations.
#[derive(Clone)]
pub struct NotificationRegistry {
    memory: Arc<dyn MemoryService>,
    scope: MemoryScope,
}

impl NotificationRegistry {
    pub fn new(memory: Arc<dyn MemoryService>) -> Self {
        NotificationRegistry { memory, scope: MemoryScope::new(MONITOR_SCOPE) }
    }

    /// Push-if-not-exists by serialized value; `true` when a new entry was
    /// added, `false` when an identical config was already registered.
    pub async fn insert(&self, config: &EventNotificationConfig) -> OpResult<bool> {
        let entry = Primitive::String(config.to_wire());
        let pushed = self
            .memory
            .push_to_list_tail_if_values_not_exists(&self.scope, CONFIG_LIST, &[entry], false)
            .await?;
        Ok(!pushed.is_empty())
    }

    pub async fn load(&self) -> OpResult<LoadedConfigs> {
        let entries =
            self.memory.get_all_elements_of_list(&self.scope, CONFIG_LIST).await?;
        let mut loaded = LoadedConfigs::default();
        for entry in entries {
            let parsed = match &entry {
                Primitive::String(raw) => EventNotificationConfig::from_wire(raw),
                _ => None,
            };
            match parsed {
                Some(config) => {
                    loaded.by_bucket.entry(config.bucket_name.clone()).or_default().push(config)
                }
                None => loaded.malformed.push(entry),
            }
        }
        Ok(loaded)
    }

    /// Remove every config of the bucket, or only those wired to `topic`.
    /// Returns the removed configs so callers can unwind topic markers.
    pub async fn remove(
        &self,
        bucket: &str,
        topic: Option<&str>,
    ) -> OpResult<Vec<EventNotificationConfig>> {
        let loaded = self.load().await?;
        let matching: Vec<EventNotificationConfig> = loaded
            .by_bucket
            .get(bucket)
            .into_iter()
            .flatten()
            .filter(|c| topic.map_or(true, |t| c.topic_name == t))
            .cloned()
            .collect();
        if matching.is_empty() {
            return Ok(matching);
        }

        let entries: Vec<Primitive> =
            matching.iter().map(|c| Primitive::String(c.to_wire())).collect();
        self.memory
            .remove_elements_from_list(&self.scope, CONFIG_LIST, &entries, false)
            .await?;
        debug!(bucket, removed = matching.len(), "removed notification configs");
        Ok(matching)
    }

    /// GC entries that failed to parse during a scan pass.
    pub async fn remove_raw(&self, entries: &[Primitive]) -> OpResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        self.memory.remove_elements_from_list(&self.scope, CONFIG_LIST, entries, false).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cck_domain::FileEvent;
    use cck_memory::InMemoryMemoryService;

    fn registry() -> NotificationRegistry {
        NotificationRegistry::new(Arc::new(InMemoryMemoryService::new()))
    }

    fn config(bucket: &str, topic: &str) -> EventNotificationConfig {
        EventNotificationConfig::new(bucket, topic, "p/", [FileEvent::Uploaded])
    }

    #[tokio::test]
    async fn insert_is_idempotent_by_value() {
        let registry = registry();
        assert!(registry.insert(&config("b", "t")).await.unwrap());
        assert!(!registry.insert(&config("b", "t")).await.unwrap());

        let loaded = registry.load().await.unwrap();
        assert_eq!(loaded.by_bucket["b"].len(), 1);
    }

    #[tokio::test]
    async fn event_order_does_not_defeat_idempotence() {
        let registry = registry();
        let a = EventNotificationConfig::new(
            "b",
            "t",
            "p/",
            [FileEvent::Uploaded, FileEvent::Deleted],
        );
        let b = EventNotificationConfig::new(
            "b",
            "t",
            "p/",
            [FileEvent::Deleted, FileEvent::Uploaded],
        );
        assert!(registry.insert(&a).await.unwrap());
        assert!(!registry.insert(&b).await.unwrap());
    }

    #[tokio::test]
    async fn remove_filters_by_topic() {
        let registry = registry();
        registry.insert(&config("b", "t1")).await.unwrap();
        registry.insert(&config("b", "t2")).await.unwrap();
        registry.insert(&config("other", "t1")).await.unwrap();

        let removed = registry.remove("b", Some("t1")).await.unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].topic_name, "t1");

        let loaded = registry.load().await.unwrap();
        assert_eq!(loaded.by_bucket["b"].len(), 1);
        assert_eq!(loaded.by_bucket["other"].len(), 1);
    }

    #[tokio::test]
    async fn malformed_entries_are_surfaced_and_removable() {
        let memory = Arc::new(InMemoryMemoryService::new());
        let registry = NotificationRegistry::new(memory.clone());
        registry.insert(&config("b", "t")).await.unwrap();

        // Simulate a corrupt entry written by an older process.
        memory
            .push_to_list_tail(
                &MemoryScope::new(MONITOR_SCOPE),
                CONFIG_LIST,
                &[Primitive::String("not-json".into())],
                false,
                false,
            )
            .await
            .unwrap();

        let loaded = registry.load().await.unwrap();
        assert_eq!(loaded.malformed.len(), 1);

        registry.remove_raw(&loaded.malformed).await.unwrap();
        let loaded = registry.load().await.unwrap();
        assert!(loaded.malformed.is_empty());
        assert_eq!(loaded.by_bucket["b"].len(), 1);
    }
}

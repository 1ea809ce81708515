use std::collections::HashMap;
use std::sync::Arc;

use cck_domain::{FileState, MemoryScope, MemoryService, OpResult, Primitive, MONITOR_SCOPE};
use tracing::debug;

// ── SnapshotStore ─────────────────────────────────────────────────────────────

/// Per-bucket baseline of the last observed object listing, persisted as a
/// memory-service list of serialized [`FileState`] records.
///
/// The list is keyed by full serialized content, so an update is a two-step
/// remove-then-append of the affected entries rather than an in-place edit.
/// Only the scan pass mutates these lists, and only inside the dispatch
/// mutex.
#[derive(Clone)]
pub struct SnapshotStore {
    memory: Arc<dyn MemoryService>,
    scope: MemoryScope,
}

impl SnapshotStore {
    pub fn new(memory: Arc<dyn MemoryService>) -> Self {
        SnapshotStore { memory, scope: MemoryScope::new(MONITOR_SCOPE) }
    }

    fn list_name(bucket: &str) -> String {
        format!("file_states_{bucket}")
    }

    pub async fn load(&self, bucket: &str) -> OpResult<HashMap<String, FileState>> {
        let entries = self
            .memory
            .get_all_elements_of_list(&self.scope, &Self::list_name(bucket))
            .await?;
        let mut states = HashMap::with_capacity(entries.len());
        for entry in entries {
            if let Primitive::String(raw) = &entry {
                if let Some(state) = FileState::from_wire(raw) {
                    states.insert(state.file_key.clone(), state);
                }
            }
        }
        Ok(states)
    }

    /// Persist the delta between the previous baseline and the states
    /// observed by the scan that just completed.
    pub async fn apply(
        &self,
        bucket: &str,
        previous: &HashMap<String, FileState>,
        current: &HashMap<String, FileState>,
    ) -> OpResult<()> {
        let list = Self::list_name(bucket);
        let mut stale: Vec<Primitive> = Vec::new();
        let mut fresh: Vec<Primitive> = Vec::new();

        for (key, prev) in previous {
            match current.get(key) {
                // Gone entirely.
                None => stale.push(Primitive::String(prev.to_wire())),
                Some(cur) if !prev.same_as(cur, true) => {
                    stale.push(Primitive::String(prev.to_wire()));
                    fresh.push(Primitive::String(cur.to_wire()));
                }
                Some(_) => {}
            }
        }
        for (key, cur) in current {
            if !previous.contains_key(key) {
                fresh.push(Primitive::String(cur.to_wire()));
            }
        }

        if !stale.is_empty() {
            self.memory.remove_elements_from_list(&self.scope, &list, &stale, false).await?;
        }
        if !fresh.is_empty() {
            self.memory.push_to_list_tail(&self.scope, &list, &fresh, false, false).await?;
        }
        debug!(bucket, removed = stale.len(), added = fresh.len(), "snapshot updated");
        Ok(())
    }

    pub async fn clear(&self, bucket: &str) -> OpResult<()> {
        self.memory.empty_list(&self.scope, &Self::list_name(bucket), false).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cck_memory::InMemoryMemoryService;
    use chrono::Utc;

    fn state(key: &str, size: u64) -> FileState {
        FileState { file_key: key.into(), last_modified: Some(Utc::now()), size, exists: true }
    }

    #[tokio::test]
    async fn apply_converges_to_the_current_listing() {
        let store = SnapshotStore::new(Arc::new(InMemoryMemoryService::new()));

        let mut current = HashMap::new();
        current.insert("a".to_string(), state("a", 1));
        current.insert("b".to_string(), state("b", 2));
        store.apply("bkt", &HashMap::new(), &current).await.unwrap();
        assert_eq!(store.load("bkt").await.unwrap(), current);

        // One modified, one removed, one added.
        let previous = current;
        let mut next = HashMap::new();
        next.insert("b".to_string(), state("b", 20));
        next.insert("c".to_string(), state("c", 3));
        store.apply("bkt", &previous, &next).await.unwrap();
        assert_eq!(store.load("bkt").await.unwrap(), next);
    }

    #[tokio::test]
    async fn clear_empties_the_baseline() {
        let store = SnapshotStore::new(Arc::new(InMemoryMemoryService::new()));
        let mut current = HashMap::new();
        current.insert("a".to_string(), state("a", 1));
        store.apply("bkt", &HashMap::new(), &current).await.unwrap();

        store.clear("bkt").await.unwrap();
        assert!(store.load("bkt").await.unwrap().is_empty());
    }
}

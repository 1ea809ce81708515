use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use cck_domain::{
    MemoryScope, MemoryService, OpError, OpResult, Primitive, PubSubService,
};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

// ── Scope storage ─────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct ScopeData {
    values: HashMap<String, Primitive>,
    lists: HashMap<String, VecDeque<Primitive>>,
    /// Scope-wide expiry deadline; covers every key and list inside.
    expires_at: Option<Instant>,
}

impl ScopeData {
    fn expired(&self) -> bool {
        self.expires_at.map_or(false, |at| Instant::now() >= at)
    }
}

#[derive(Debug, Default)]
struct Inner {
    scopes: HashMap<String, ScopeData>,
}

impl Inner {
    /// Read access; an expired scope reads as absent.
    fn live(&self, name: &str) -> Option<&ScopeData> {
        self.scopes.get(name).filter(|s| !s.expired())
    }

    /// Write access; expired scopes are dropped before the entry is
    /// (re)created.
    fn entry(&mut self, name: &str) -> &mut ScopeData {
        if self.scopes.get(name).map_or(false, |s| s.expired()) {
            self.scopes.remove(name);
        }
        self.scopes.entry(name.to_string()).or_default()
    }

    fn live_mut(&mut self, name: &str) -> Option<&mut ScopeData> {
        if self.scopes.get(name).map_or(false, |s| s.expired()) {
            self.scopes.remove(name);
            return None;
        }
        self.scopes.get_mut(name)
    }
}

// ── InMemoryMemoryService ─────────────────────────────────────────────────────

/// Process-local implementation of [`MemoryService`].
///
/// All data is lost on process exit. Suitable for tests and single-node
/// deployments; the mutex primitives still behave correctly across tasks
/// sharing the instance.
#[derive(Clone, Default)]
pub struct InMemoryMemoryService {
    inner: Arc<RwLock<Inner>>,
    pubsub: Option<Arc<dyn PubSubService>>,
}

impl InMemoryMemoryService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a pub/sub handle used for `publish_change` notifications.
    pub fn with_pubsub(pubsub: Arc<dyn PubSubService>) -> Self {
        InMemoryMemoryService { inner: Arc::default(), pubsub: Some(pubsub) }
    }

    async fn publish_change(
        &self,
        requested: bool,
        scope: &MemoryScope,
        operation: &str,
        changes: Value,
    ) -> OpResult<()> {
        if !requested {
            return Ok(());
        }
        let pubsub = self.pubsub.as_ref().ok_or_else(|| {
            OpError::not_implemented("change publishing requires an attached pub/sub service")
        })?;
        let message = json!({ "operation": operation, "changes": changes }).to_string();
        pubsub.publish(&scope.compile(), &message).await
    }
}

#[async_trait]
impl MemoryService for InMemoryMemoryService {
    async fn set_key_expire_time(&self, scope: &MemoryScope, ttl: Duration) -> OpResult<bool> {
        let mut inner = self.inner.write().await;
        let data = inner.entry(&scope.compile());
        data.expires_at = Some(Instant::now() + ttl);
        Ok(true)
    }

    async fn get_key_expire_time(&self, scope: &MemoryScope) -> OpResult<Option<Duration>> {
        let inner = self.inner.read().await;
        Ok(inner
            .live(&scope.compile())
            .and_then(|s| s.expires_at)
            .map(|at| at.saturating_duration_since(Instant::now())))
    }

    async fn set_key_values(
        &self,
        scope: &MemoryScope,
        pairs: &[(String, Primitive)],
        publish_change: bool,
    ) -> OpResult<bool> {
        if pairs.is_empty() {
            return Err(OpError::bad_request("no key/value pairs given"));
        }
        {
            let mut inner = self.inner.write().await;
            let data = inner.entry(&scope.compile());
            for (key, value) in pairs {
                data.values.insert(key.clone(), value.clone());
            }
        }
        let changes: Value =
            pairs.iter().map(|(k, v)| (k.clone(), v.to_json())).collect::<serde_json::Map<_, _>>().into();
        self.publish_change(publish_change, scope, "SetKeyValues", changes).await?;
        Ok(true)
    }

    async fn set_key_value_conditionally(
        &self,
        scope: &MemoryScope,
        key: &str,
        value: &Primitive,
        publish_change: bool,
    ) -> OpResult<bool> {
        let installed = {
            let mut inner = self.inner.write().await;
            let data = inner.entry(&scope.compile());
            if data.values.contains_key(key) {
                false
            } else {
                data.values.insert(key.to_string(), value.clone());
                true
            }
        };
        if installed {
            self.publish_change(
                publish_change,
                scope,
                "SetKeyValueConditionally",
                json!({ key: value.to_json() }),
            )
            .await?;
        }
        Ok(installed)
    }

    async fn get_key_value(&self, scope: &MemoryScope, key: &str) -> OpResult<Option<Primitive>> {
        let inner = self.inner.read().await;
        Ok(inner.live(&scope.compile()).and_then(|s| s.values.get(key).cloned()))
    }

    async fn get_key_values(
        &self,
        scope: &MemoryScope,
        keys: &[String],
    ) -> OpResult<HashMap<String, Primitive>> {
        let inner = self.inner.read().await;
        let mut out = HashMap::new();
        if let Some(data) = inner.live(&scope.compile()) {
            for key in keys {
                if let Some(value) = data.values.get(key) {
                    out.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(out)
    }

    async fn get_all_key_values(
        &self,
        scope: &MemoryScope,
    ) -> OpResult<HashMap<String, Primitive>> {
        let inner = self.inner.read().await;
        Ok(inner.live(&scope.compile()).map(|s| s.values.clone()).unwrap_or_default())
    }

    async fn delete_key(
        &self,
        scope: &MemoryScope,
        key: &str,
        publish_change: bool,
    ) -> OpResult<bool> {
        let removed = {
            let mut inner = self.inner.write().await;
            inner
                .live_mut(&scope.compile())
                .map_or(false, |s| s.values.remove(key).is_some())
        };
        if removed {
            self.publish_change(publish_change, scope, "DeleteKey", json!({ "key": key })).await?;
        }
        Ok(removed)
    }

    async fn delete_all_keys(&self, scope: &MemoryScope, publish_change: bool) -> OpResult<bool> {
        let removed = {
            let mut inner = self.inner.write().await;
            inner.scopes.remove(&scope.compile()).is_some()
        };
        if removed {
            self.publish_change(publish_change, scope, "DeleteAllKeys", Value::Null).await?;
        }
        Ok(removed)
    }

    async fn get_keys(&self, scope: &MemoryScope) -> OpResult<Vec<String>> {
        let inner = self.inner.read().await;
        Ok(inner
            .live(&scope.compile())
            .map(|s| s.values.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_keys_count(&self, scope: &MemoryScope) -> OpResult<u64> {
        let inner = self.inner.read().await;
        Ok(inner.live(&scope.compile()).map_or(0, |s| s.values.len() as u64))
    }

    async fn increment_key_values(
        &self,
        scope: &MemoryScope,
        deltas: &[(String, i64)],
        publish_change: bool,
    ) -> OpResult<HashMap<String, i64>> {
        if deltas.is_empty() {
            return Err(OpError::bad_request("no increments given"));
        }
        let new_values = {
            let mut inner = self.inner.write().await;
            let data = inner.entry(&scope.compile());
            let mut out = HashMap::new();
            for (key, delta) in deltas {
                let current = match data.values.get(key) {
                    Some(Primitive::Integer(i)) => *i,
                    _ => 0,
                };
                let next = current + delta;
                data.values.insert(key.clone(), Primitive::Integer(next));
                out.insert(key.clone(), next);
            }
            out
        };
        let changes: Value = new_values
            .iter()
            .map(|(k, v)| (k.clone(), Value::from(*v)))
            .collect::<serde_json::Map<_, _>>()
            .into();
        self.publish_change(publish_change, scope, "IncrementKeyValues", changes).await?;
        Ok(new_values)
    }

    async fn increment_key_by_value_and_get(
        &self,
        scope: &MemoryScope,
        key: &str,
        delta: i64,
        publish_change: bool,
    ) -> OpResult<i64> {
        let deltas = [(key.to_string(), delta)];
        let new_values = self.increment_key_values(scope, &deltas, publish_change).await?;
        new_values
            .get(key)
            .copied()
            .ok_or_else(|| OpError::internal("incremented key missing from result"))
    }

    async fn push_to_list_tail(
        &self,
        scope: &MemoryScope,
        list: &str,
        values: &[Primitive],
        only_if_exists: bool,
        publish_change: bool,
    ) -> OpResult<bool> {
        self.push_to_list(scope, list, values, only_if_exists, publish_change, true).await
    }

    async fn push_to_list_head(
        &self,
        scope: &MemoryScope,
        list: &str,
        values: &[Primitive],
        only_if_exists: bool,
        publish_change: bool,
    ) -> OpResult<bool> {
        self.push_to_list(scope, list, values, only_if_exists, publish_change, false).await
    }

    async fn push_to_list_tail_if_values_not_exists(
        &self,
        scope: &MemoryScope,
        list: &str,
        values: &[Primitive],
        publish_change: bool,
    ) -> OpResult<Vec<Primitive>> {
        if values.is_empty() {
            return Err(OpError::bad_request("no values given"));
        }
        let pushed = {
            let mut inner = self.inner.write().await;
            let data = inner.entry(&scope.compile());
            let entries = data.lists.entry(list.to_string()).or_default();
            let mut pushed = Vec::new();
            for value in values {
                if !entries.contains(value) && !pushed.contains(value) {
                    entries.push_back(value.clone());
                    pushed.push(value.clone());
                }
            }
            pushed
        };
        if !pushed.is_empty() {
            let changes = json!({
                "list": list,
                "pushed": pushed.iter().map(|v| v.to_json()).collect::<Vec<_>>(),
            });
            self.publish_change(publish_change, scope, "PushToListTailIfValuesNotExists", changes)
                .await?;
        }
        Ok(pushed)
    }

    async fn pop_last_element_of_list(
        &self,
        scope: &MemoryScope,
        list: &str,
        publish_change: bool,
    ) -> OpResult<Option<Primitive>> {
        self.pop_from_list(scope, list, publish_change, true).await
    }

    async fn pop_first_element_of_list(
        &self,
        scope: &MemoryScope,
        list: &str,
        publish_change: bool,
    ) -> OpResult<Option<Primitive>> {
        self.pop_from_list(scope, list, publish_change, false).await
    }

    async fn remove_elements_from_list(
        &self,
        scope: &MemoryScope,
        list: &str,
        values: &[Primitive],
        publish_change: bool,
    ) -> OpResult<Vec<Primitive>> {
        if values.is_empty() {
            return Err(OpError::bad_request("no values given"));
        }
        let removed = {
            let mut inner = self.inner.write().await;
            let mut removed = Vec::new();
            if let Some(data) = inner.live_mut(&scope.compile()) {
                if let Some(entries) = data.lists.get_mut(list) {
                    for value in values {
                        let before = entries.len();
                        entries.retain(|v| v != value);
                        if entries.len() != before {
                            removed.push(value.clone());
                        }
                    }
                }
            }
            removed
        };
        if !removed.is_empty() {
            let changes = json!({
                "list": list,
                "removed": removed.iter().map(|v| v.to_json()).collect::<Vec<_>>(),
            });
            self.publish_change(publish_change, scope, "RemoveElementsFromList", changes).await?;
        }
        Ok(removed)
    }

    async fn get_all_elements_of_list(
        &self,
        scope: &MemoryScope,
        list: &str,
    ) -> OpResult<Vec<Primitive>> {
        let inner = self.inner.read().await;
        Ok(inner
            .live(&scope.compile())
            .and_then(|s| s.lists.get(list))
            .map(|l| l.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_list_size(&self, scope: &MemoryScope, list: &str) -> OpResult<u64> {
        let inner = self.inner.read().await;
        Ok(inner
            .live(&scope.compile())
            .and_then(|s| s.lists.get(list))
            .map_or(0, |l| l.len() as u64))
    }

    async fn list_contains(
        &self,
        scope: &MemoryScope,
        list: &str,
        value: &Primitive,
    ) -> OpResult<bool> {
        let inner = self.inner.read().await;
        Ok(inner
            .live(&scope.compile())
            .and_then(|s| s.lists.get(list))
            .map_or(false, |l| l.contains(value)))
    }

    async fn empty_list(
        &self,
        scope: &MemoryScope,
        list: &str,
        publish_change: bool,
    ) -> OpResult<bool> {
        let removed = {
            let mut inner = self.inner.write().await;
            inner
                .live_mut(&scope.compile())
                .map_or(false, |s| s.lists.remove(list).is_some())
        };
        if removed {
            self.publish_change(publish_change, scope, "EmptyList", json!({ "list": list }))
                .await?;
        }
        Ok(removed)
    }

    async fn empty_list_and_sublists(
        &self,
        scope: &MemoryScope,
        list_prefix: &str,
        publish_change: bool,
    ) -> OpResult<bool> {
        let removed = {
            let mut inner = self.inner.write().await;
            match inner.live_mut(&scope.compile()) {
                Some(data) => {
                    let before = data.lists.len();
                    data.lists.retain(|name, _| !name.starts_with(list_prefix));
                    data.lists.len() != before
                }
                None => false,
            }
        };
        if removed {
            self.publish_change(
                publish_change,
                scope,
                "EmptyListAndSublists",
                json!({ "list_prefix": list_prefix }),
            )
            .await?;
        }
        Ok(removed)
    }

    async fn mutex_lock(
        &self,
        scope: &MemoryScope,
        name: &str,
        ttl: Duration,
    ) -> OpResult<Option<String>> {
        let mut inner = self.inner.write().await;
        let data = inner.entry(&scope.compile());
        if data.values.contains_key(name) {
            return Ok(None);
        }
        let lock_id = Uuid::new_v4().to_string();
        data.values.insert(name.to_string(), Primitive::String(lock_id.clone()));
        data.expires_at = Some(Instant::now() + ttl);
        Ok(Some(lock_id))
    }

    async fn mutex_unlock(
        &self,
        scope: &MemoryScope,
        name: &str,
        lock_id: &str,
    ) -> OpResult<bool> {
        let mut inner = self.inner.write().await;
        let Some(data) = inner.live_mut(&scope.compile()) else {
            return Ok(false);
        };
        match data.values.get(name) {
            Some(Primitive::String(held)) if held == lock_id => {
                data.values.remove(name);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

impl InMemoryMemoryService {
    async fn push_to_list(
        &self,
        scope: &MemoryScope,
        list: &str,
        values: &[Primitive],
        only_if_exists: bool,
        publish_change: bool,
        tail: bool,
    ) -> OpResult<bool> {
        if values.is_empty() {
            return Err(OpError::bad_request("no values given"));
        }
        let pushed = {
            let mut inner = self.inner.write().await;
            let data = inner.entry(&scope.compile());
            if only_if_exists && !data.lists.contains_key(list) {
                false
            } else {
                let entries = data.lists.entry(list.to_string()).or_default();
                for value in values {
                    if tail {
                        entries.push_back(value.clone());
                    } else {
                        entries.push_front(value.clone());
                    }
                }
                true
            }
        };
        if pushed {
            let operation = if tail { "PushToListTail" } else { "PushToListHead" };
            let changes = json!({
                "list": list,
                "values": values.iter().map(|v| v.to_json()).collect::<Vec<_>>(),
            });
            self.publish_change(publish_change, scope, operation, changes).await?;
        }
        Ok(pushed)
    }

    async fn pop_from_list(
        &self,
        scope: &MemoryScope,
        list: &str,
        publish_change: bool,
        last: bool,
    ) -> OpResult<Option<Primitive>> {
        let popped = {
            let mut inner = self.inner.write().await;
            inner.live_mut(&scope.compile()).and_then(|data| {
                let entries = data.lists.get_mut(list)?;
                if last {
                    entries.pop_back()
                } else {
                    entries.pop_front()
                }
            })
        };
        if let Some(value) = &popped {
            let operation = if last { "PopLastElementOfList" } else { "PopFirstElementOfList" };
            self.publish_change(
                publish_change,
                scope,
                operation,
                json!({ "list": list, "value": value.to_json() }),
            )
            .await?;
        }
        Ok(popped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> MemoryScope {
        MemoryScope::new("test-scope")
    }

    #[tokio::test]
    async fn set_and_get_round_trip() {
        let mem = InMemoryMemoryService::new();
        mem.set_key_values(&scope(), &[("k".into(), Primitive::Integer(7))], false)
            .await
            .unwrap();
        let got = mem.get_key_value(&scope(), "k").await.unwrap();
        assert_eq!(got, Some(Primitive::Integer(7)));
    }

    #[tokio::test]
    async fn conditional_set_only_installs_once() {
        let mem = InMemoryMemoryService::new();
        let first = mem
            .set_key_value_conditionally(&scope(), "k", &Primitive::Integer(1), false)
            .await
            .unwrap();
        let second = mem
            .set_key_value_conditionally(&scope(), "k", &Primitive::Integer(2), false)
            .await
            .unwrap();
        assert!(first);
        assert!(!second);
        assert_eq!(mem.get_key_value(&scope(), "k").await.unwrap(), Some(Primitive::Integer(1)));
    }

    #[tokio::test]
    async fn expired_scope_reads_as_absent() {
        let mem = InMemoryMemoryService::new();
        mem.set_key_values(&scope(), &[("k".into(), Primitive::Integer(1))], false)
            .await
            .unwrap();
        mem.set_key_expire_time(&scope(), Duration::from_millis(20)).await.unwrap();

        let remaining = mem.get_key_expire_time(&scope()).await.unwrap();
        assert!(remaining.is_some());
        assert!(remaining.unwrap() <= Duration::from_millis(20));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(mem.get_key_value(&scope(), "k").await.unwrap(), None);
        assert_eq!(mem.get_keys_count(&scope()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn push_if_not_exists_returns_only_new_values() {
        let mem = InMemoryMemoryService::new();
        let a = Primitive::String("a".into());
        let b = Primitive::String("b".into());
        let c = Primitive::String("c".into());

        let first = mem
            .push_to_list_tail_if_values_not_exists(
                &scope(),
                "l",
                &[a.clone(), b.clone()],
                false,
            )
            .await
            .unwrap();
        assert_eq!(first, vec![a.clone(), b.clone()]);

        let second = mem
            .push_to_list_tail_if_values_not_exists(
                &scope(),
                "l",
                &[b.clone(), c.clone()],
                false,
            )
            .await
            .unwrap();
        assert_eq!(second, vec![c.clone()]);
        assert_eq!(
            mem.get_all_elements_of_list(&scope(), "l").await.unwrap(),
            vec![a, b, c]
        );
    }

    #[tokio::test]
    async fn remove_elements_reports_removed_subset() {
        let mem = InMemoryMemoryService::new();
        let values: Vec<Primitive> = [1, 2, 2, 3].iter().map(|i| Primitive::Integer(*i)).collect();
        mem.push_to_list_tail(&scope(), "l", &values, false, false).await.unwrap();

        let removed = mem
            .remove_elements_from_list(
                &scope(),
                "l",
                &[Primitive::Integer(2), Primitive::Integer(9)],
                false,
            )
            .await
            .unwrap();
        assert_eq!(removed, vec![Primitive::Integer(2)]);
        assert_eq!(
            mem.get_all_elements_of_list(&scope(), "l").await.unwrap(),
            vec![Primitive::Integer(1), Primitive::Integer(3)]
        );
    }

    #[tokio::test]
    async fn only_if_exists_push_skips_missing_list() {
        let mem = InMemoryMemoryService::new();
        let pushed = mem
            .push_to_list_tail(&scope(), "missing", &[Primitive::Integer(1)], true, false)
            .await
            .unwrap();
        assert!(!pushed);
        assert_eq!(mem.get_list_size(&scope(), "missing").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn increments_accumulate() {
        let mem = InMemoryMemoryService::new();
        mem.increment_key_by_value_and_get(&scope(), "n", 5, false).await.unwrap();
        let got = mem.increment_key_by_value_and_get(&scope(), "n", -2, false).await.unwrap();
        assert_eq!(got, 3);
    }

    #[tokio::test]
    async fn publish_change_without_pubsub_is_not_implemented() {
        let mem = InMemoryMemoryService::new();
        let err = mem
            .set_key_values(&scope(), &[("k".into(), Primitive::Integer(1))], true)
            .await
            .unwrap_err();
        assert_eq!(err.status(), 501);
    }

    #[tokio::test]
    async fn mutex_lock_is_exclusive_until_unlocked() {
        let mem = InMemoryMemoryService::new();
        let s = MemoryScope::new("mutex-scope");
        let ttl = Duration::from_secs(5);

        let lock_id = mem.mutex_lock(&s, "n", ttl).await.unwrap().expect("first lock");
        assert_eq!(mem.mutex_lock(&s, "n", ttl).await.unwrap(), None);

        assert!(!mem.mutex_unlock(&s, "n", "wrong-token").await.unwrap());
        assert!(mem.mutex_unlock(&s, "n", &lock_id).await.unwrap());
        assert!(mem.mutex_lock(&s, "n", ttl).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn mutex_ttl_elapses_and_releases() {
        let mem = InMemoryMemoryService::new();
        let s = MemoryScope::new("mutex-ttl");
        mem.mutex_lock(&s, "n", Duration::from_millis(20)).await.unwrap().expect("lock");
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(mem.mutex_lock(&s, "n", Duration::from_secs(5)).await.unwrap().is_some());
    }
}

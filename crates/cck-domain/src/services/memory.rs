use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::OpResult;
use crate::primitive::Primitive;
use crate::scope::MemoryScope;

/// Scoped key/value and ordered-list store with scope-wide TTL, the mutex
/// primitives, and an optional change-notification hook.
///
/// A scope owns a single TTL governing every key and list inside it;
/// setting it resets the scope's expiry and list writes inherit it. When an
/// operation is called with `publish_change` and the backend has a pub/sub
/// handle attached, a JSON `{operation, changes}` notification is published
/// to the scope's compiled name.
#[async_trait]
pub trait MemoryService: Send + Sync {
    // ── Expiry ────────────────────────────────────────────────────────────

    async fn set_key_expire_time(&self, scope: &MemoryScope, ttl: Duration) -> OpResult<bool>;

    /// Remaining time to live of the scope, `None` when no TTL is set.
    async fn get_key_expire_time(&self, scope: &MemoryScope) -> OpResult<Option<Duration>>;

    // ── Key/value ─────────────────────────────────────────────────────────

    async fn set_key_values(
        &self,
        scope: &MemoryScope,
        pairs: &[(String, Primitive)],
        publish_change: bool,
    ) -> OpResult<bool>;

    /// Set-if-not-exists. Returns `false` when the key already holds a value.
    async fn set_key_value_conditionally(
        &self,
        scope: &MemoryScope,
        key: &str,
        value: &Primitive,
        publish_change: bool,
    ) -> OpResult<bool>;

    async fn get_key_value(&self, scope: &MemoryScope, key: &str) -> OpResult<Option<Primitive>>;

    async fn get_key_values(
        &self,
        scope: &MemoryScope,
        keys: &[String],
    ) -> OpResult<HashMap<String, Primitive>>;

    async fn get_all_key_values(
        &self,
        scope: &MemoryScope,
    ) -> OpResult<HashMap<String, Primitive>>;

    async fn delete_key(
        &self,
        scope: &MemoryScope,
        key: &str,
        publish_change: bool,
    ) -> OpResult<bool>;

    async fn delete_all_keys(&self, scope: &MemoryScope, publish_change: bool) -> OpResult<bool>;

    async fn get_keys(&self, scope: &MemoryScope) -> OpResult<Vec<String>>;

    async fn get_keys_count(&self, scope: &MemoryScope) -> OpResult<u64>;

    /// Add each delta to its key (missing keys start at zero); returns the
    /// new values.
    async fn increment_key_values(
        &self,
        scope: &MemoryScope,
        deltas: &[(String, i64)],
        publish_change: bool,
    ) -> OpResult<HashMap<String, i64>>;

    async fn increment_key_by_value_and_get(
        &self,
        scope: &MemoryScope,
        key: &str,
        delta: i64,
        publish_change: bool,
    ) -> OpResult<i64>;

    // ── Lists ─────────────────────────────────────────────────────────────

    async fn push_to_list_tail(
        &self,
        scope: &MemoryScope,
        list: &str,
        values: &[Primitive],
        only_if_exists: bool,
        publish_change: bool,
    ) -> OpResult<bool>;

    async fn push_to_list_head(
        &self,
        scope: &MemoryScope,
        list: &str,
        values: &[Primitive],
        only_if_exists: bool,
        publish_change: bool,
    ) -> OpResult<bool>;

    /// Append only the values not already present; returns exactly the
    /// subset that was pushed.
    async fn push_to_list_tail_if_values_not_exists(
        &self,
        scope: &MemoryScope,
        list: &str,
        values: &[Primitive],
        publish_change: bool,
    ) -> OpResult<Vec<Primitive>>;

    async fn pop_last_element_of_list(
        &self,
        scope: &MemoryScope,
        list: &str,
        publish_change: bool,
    ) -> OpResult<Option<Primitive>>;

    async fn pop_first_element_of_list(
        &self,
        scope: &MemoryScope,
        list: &str,
        publish_change: bool,
    ) -> OpResult<Option<Primitive>>;

    /// Remove all occurrences of each given value; returns the values that
    /// were actually removed at least once.
    async fn remove_elements_from_list(
        &self,
        scope: &MemoryScope,
        list: &str,
        values: &[Primitive],
        publish_change: bool,
    ) -> OpResult<Vec<Primitive>>;

    async fn get_all_elements_of_list(
        &self,
        scope: &MemoryScope,
        list: &str,
    ) -> OpResult<Vec<Primitive>>;

    async fn get_list_size(&self, scope: &MemoryScope, list: &str) -> OpResult<u64>;

    async fn list_contains(
        &self,
        scope: &MemoryScope,
        list: &str,
        value: &Primitive,
    ) -> OpResult<bool>;

    async fn empty_list(
        &self,
        scope: &MemoryScope,
        list: &str,
        publish_change: bool,
    ) -> OpResult<bool>;

    /// Empty the list and every list whose name extends it with a sublist
    /// suffix.
    async fn empty_list_and_sublists(
        &self,
        scope: &MemoryScope,
        list_prefix: &str,
        publish_change: bool,
    ) -> OpResult<bool>;

    // ── Mutex primitives ──────────────────────────────────────────────────

    /// Atomically install a fresh lock token under `(scope, name)` when none
    /// is live. Returns the token on success, `None` when already held. The
    /// TTL applies to the whole scope, so mutex scopes must be isolated from
    /// data scopes.
    async fn mutex_lock(
        &self,
        scope: &MemoryScope,
        name: &str,
        ttl: Duration,
    ) -> OpResult<Option<String>>;

    /// Release only when the stored token equals `lock_id`.
    async fn mutex_unlock(
        &self,
        scope: &MemoryScope,
        name: &str,
        lock_id: &str,
    ) -> OpResult<bool>;
}

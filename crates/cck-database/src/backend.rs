use async_trait::async_trait;
use cck_domain::{DbKey, OpResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One persisted document: its identity plus the body.
///
/// The body never carries the key attribute; the envelope records identity
/// so scans can re-inject it without a caller-supplied key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredItem {
    pub key: DbKey,
    pub body: Map<String, Value>,
}

/// Raw storage seam beneath the database engine.
///
/// `key_id` is the canonical string of the key primitive; it is the
/// per-table identity of an item. Backends only move envelopes around;
/// every semantic rule (conditions, merging, return images) lives in the
/// engine.
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    async fn read(&self, table: &str, key_id: &str) -> OpResult<Option<StoredItem>>;

    async fn write(&self, table: &str, key_id: &str, item: &StoredItem) -> OpResult<()>;

    async fn remove(&self, table: &str, key_id: &str) -> OpResult<()>;

    /// Key ids of every item in the table, or `None` when the backend has
    /// no native enumeration and the engine must consult its key index.
    async fn native_keys(&self, table: &str) -> OpResult<Option<Vec<String>>>;

    async fn drop_table(&self, table: &str) -> OpResult<()>;
}

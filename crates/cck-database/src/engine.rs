use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use base64::Engine as _;
use cck_domain::{
    AttributeCondition, DatabaseOptions, DatabaseService, DbKey, MemoryService, OpError, OpResult,
    Primitive, ReturnValues, ScanPage,
};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::debug;

use crate::backend::{DocumentBackend, StoredItem};
use crate::conditions;
use crate::fs::FsDocumentBackend;
use crate::key_index::TableKeyIndex;
use crate::memory::MemoryDocumentBackend;
use crate::postprocess;

// ── Engine ────────────────────────────────────────────────────────────────────

/// Implements the full conditional-operation semantics of
/// [`DatabaseService`] over a raw [`DocumentBackend`].
///
/// Per-key write locks make every read-modify-write atomic within this
/// instance; backends shared across processes need a backend-native
/// conditional write or an external mutex on top.
pub struct DatabaseEngine<B: DocumentBackend> {
    backend: B,
    options: RwLock<DatabaseOptions>,
    key_index: Option<TableKeyIndex>,
    write_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// Database over plain process memory; key enumeration is native.
pub type InMemoryDatabaseService = DatabaseEngine<MemoryDocumentBackend>;

/// Database over one-JSON-file-per-item storage; scans run through the
/// table key index kept in the memory service.
pub type FsDatabaseService = DatabaseEngine<FsDocumentBackend>;

impl InMemoryDatabaseService {
    pub fn in_memory() -> Self {
        Self::with_backend(MemoryDocumentBackend::new(), None)
    }
}

impl FsDatabaseService {
    pub fn on_disk(root: impl Into<PathBuf>, memory: Arc<dyn MemoryService>) -> Self {
        Self::with_backend(FsDocumentBackend::new(root), Some(TableKeyIndex::new(memory)))
    }
}

impl<B: DocumentBackend> DatabaseEngine<B> {
    pub fn with_backend(backend: B, key_index: Option<TableKeyIndex>) -> Self {
        DatabaseEngine {
            backend,
            options: RwLock::new(DatabaseOptions::default()),
            key_index,
            write_locks: Mutex::new(HashMap::new()),
        }
    }

    fn key_id(key: &DbKey) -> String {
        key.value.canonical_string()
    }

    async fn write_lock(&self, table: &str, key_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.write_locks.lock().await;
        locks
            .entry(format!("{table}/{key_id}"))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// The logical item a condition sees: the stored body with the key
    /// attribute present.
    fn logical_item(key: &DbKey, body: &Map<String, Value>) -> Map<String, Value> {
        let mut logical = body.clone();
        postprocess::inject_key(&mut logical, key);
        logical
    }

    fn check_conditions(
        key: &DbKey,
        body: Option<&Map<String, Value>>,
        conds: &[AttributeCondition],
    ) -> OpResult<()> {
        let holds = match body {
            Some(body) => conditions::all_hold(conds, &Self::logical_item(key, body)),
            None => conditions::all_hold(conds, &Map::new()),
        };
        if holds {
            Ok(())
        } else {
            Err(OpError::precondition_failed("condition not satisfied"))
        }
    }

    /// Body as the caller gets it back: key re-injected, options applied.
    fn finish(&self, key: &DbKey, body: Map<String, Value>) -> Value {
        let mut body = body;
        postprocess::inject_key(&mut body, key);
        let mut value = Value::Object(body);
        postprocess::apply(self.options(), &mut value);
        value
    }

    fn returned(
        &self,
        return_values: ReturnValues,
        key: &DbKey,
        old: Option<&Map<String, Value>>,
        new: Option<&Map<String, Value>>,
    ) -> Option<Value> {
        match return_values {
            ReturnValues::DoNotReturn => None,
            ReturnValues::OldValues => old.map(|b| self.finish(key, b.clone())),
            ReturnValues::NewValues => new.map(|b| self.finish(key, b.clone())),
        }
    }

    async fn store(&self, table: &str, key: &DbKey, body: Map<String, Value>) -> OpResult<()> {
        let item = StoredItem { key: key.clone(), body };
        self.backend.write(table, &Self::key_id(key), &item).await
    }

    async fn post_insert(&self, table: &str, key_id: &str) -> OpResult<()> {
        if let Some(index) = &self.key_index {
            index.post_insert(table, key_id).await?;
        }
        Ok(())
    }

    async fn enumerate(&self, table: &str) -> OpResult<Vec<String>> {
        if let Some(keys) = self.backend.native_keys(table).await? {
            return Ok(keys);
        }
        match &self.key_index {
            Some(index) => index.keys(table).await,
            None => Err(OpError::internal(
                "backend has no native key enumeration and no key index is configured",
            )),
        }
    }

    async fn load_sorted(&self, table: &str) -> OpResult<Vec<StoredItem>> {
        let mut key_ids = self.enumerate(table).await?;
        key_ids.sort();
        let mut items = Vec::with_capacity(key_ids.len());
        for key_id in &key_ids {
            // Index entries may outlive their item; skip the holes.
            if let Some(item) = self.backend.read(table, key_id).await? {
                items.push(item);
            }
        }
        Ok(items)
    }
}

fn as_object(value: &Value) -> OpResult<&Map<String, Value>> {
    value.as_object().ok_or_else(|| OpError::bad_request("item body must be a JSON object"))
}

/// The incoming body with the key attribute stripped; it is re-injected on
/// every read instead of being stored.
fn strip_key(key: &DbKey, body: &Map<String, Value>) -> Map<String, Value> {
    let mut body = body.clone();
    body.remove(&key.name);
    body
}

fn validate_elements(elements: &[Primitive]) -> OpResult<()> {
    let Some(first) = elements.first() else {
        return Err(OpError::bad_request("element list must not be empty"));
    };
    if elements.iter().any(|e| e.kind() != first.kind()) {
        return Err(OpError::bad_request("elements must all be of one primitive kind"));
    }
    Ok(())
}

fn encode_page_token(offset: usize) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(offset.to_string())
}

fn decode_page_token(token: &str) -> OpResult<usize> {
    base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(token.as_bytes())
        .ok()
        .and_then(|raw| String::from_utf8(raw).ok())
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| OpError::bad_request("malformed page token"))
}

// ── DatabaseService ───────────────────────────────────────────────────────────

#[async_trait]
impl<B: DocumentBackend> DatabaseService for DatabaseEngine<B> {
    fn options(&self) -> DatabaseOptions {
        *self.options.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_options(&self, options: DatabaseOptions) {
        *self.options.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = options;
    }

    async fn item_exists(
        &self,
        table: &str,
        key: &DbKey,
        conditions: &[AttributeCondition],
    ) -> OpResult<bool> {
        match self.backend.read(table, &Self::key_id(key)).await? {
            None => Err(OpError::not_found(format!("item {key} not found in {table}"))),
            Some(item) => {
                Self::check_conditions(key, Some(&item.body), conditions)?;
                Ok(true)
            }
        }
    }

    async fn get_item(&self, table: &str, key: &DbKey) -> OpResult<Option<Value>> {
        let item = self.backend.read(table, &Self::key_id(key)).await?;
        Ok(item.map(|i| self.finish(key, i.body)))
    }

    async fn get_items(&self, table: &str, keys: &[DbKey]) -> OpResult<Vec<Value>> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(item) = self.backend.read(table, &Self::key_id(key)).await? {
                out.push(self.finish(key, item.body));
            }
        }
        Ok(out)
    }

    async fn put_item(
        &self,
        table: &str,
        key: &DbKey,
        item: &Value,
        return_values: ReturnValues,
        overwrite: bool,
    ) -> OpResult<Option<Value>> {
        let incoming = as_object(item)?;
        let key_id = Self::key_id(key);
        let lock = self.write_lock(table, &key_id).await;
        let _guard = lock.lock().await;

        let existing = self.backend.read(table, &key_id).await?;
        if existing.is_some() && !overwrite {
            return Err(OpError::conflict(format!("item {key} already exists in {table}")));
        }
        let old = existing.map(|e| e.body);
        let new = strip_key(key, incoming);
        self.store(table, key, new.clone()).await?;
        if old.is_none() {
            self.post_insert(table, &key_id).await?;
        }
        debug!(table, key = %key, replaced = old.is_some(), "put item");
        Ok(self.returned(return_values, key, old.as_ref(), Some(&new)))
    }

    async fn update_item(
        &self,
        table: &str,
        key: &DbKey,
        update: &Value,
        return_values: ReturnValues,
        conditions: &[AttributeCondition],
    ) -> OpResult<Option<Value>> {
        let incoming = as_object(update)?;
        let key_id = Self::key_id(key);
        let lock = self.write_lock(table, &key_id).await;
        let _guard = lock.lock().await;

        let existing = self.backend.read(table, &key_id).await?;
        let old = existing.as_ref().map(|e| e.body.clone());
        Self::check_conditions(key, old.as_ref(), conditions)?;

        let mut new = old.clone().unwrap_or_default();
        for (attr, value) in strip_key(key, incoming) {
            new.insert(attr, value);
        }
        self.store(table, key, new.clone()).await?;
        if old.is_none() {
            self.post_insert(table, &key_id).await?;
        }
        debug!(table, key = %key, created = old.is_none(), "updated item");
        Ok(self.returned(return_values, key, old.as_ref(), Some(&new)))
    }

    async fn delete_item(
        &self,
        table: &str,
        key: &DbKey,
        return_values: ReturnValues,
        conditions: &[AttributeCondition],
    ) -> OpResult<Option<Value>> {
        let key_id = Self::key_id(key);
        let lock = self.write_lock(table, &key_id).await;
        let _guard = lock.lock().await;

        let Some(existing) = self.backend.read(table, &key_id).await? else {
            // Deleting what is not there succeeds with a null payload.
            return Ok(None);
        };
        Self::check_conditions(key, Some(&existing.body), conditions)?;

        self.backend.remove(table, &key_id).await?;
        if let Some(index) = &self.key_index {
            index.post_remove(table, &key_id).await?;
        }
        debug!(table, key = %key, "deleted item");
        Ok(self.returned(return_values, key, Some(&existing.body), None))
    }

    async fn add_elements_to_array(
        &self,
        table: &str,
        key: &DbKey,
        attribute: &str,
        elements: &[Primitive],
        return_values: ReturnValues,
        conditions: &[AttributeCondition],
    ) -> OpResult<Option<Value>> {
        validate_elements(elements)?;
        let key_id = Self::key_id(key);
        let lock = self.write_lock(table, &key_id).await;
        let _guard = lock.lock().await;

        let existing = self.backend.read(table, &key_id).await?;
        let old = existing.as_ref().map(|e| e.body.clone());
        Self::check_conditions(key, old.as_ref(), conditions)?;

        let mut new = old.clone().unwrap_or_default();
        let slot = new.entry(attribute.to_string()).or_insert_with(|| Value::Array(Vec::new()));
        let Value::Array(array) = slot else {
            return Err(OpError::bad_request(format!("attribute {attribute} is not an array")));
        };
        array.extend(elements.iter().map(Primitive::to_json));

        self.store(table, key, new.clone()).await?;
        if old.is_none() {
            self.post_insert(table, &key_id).await?;
        }
        Ok(self.returned(return_values, key, old.as_ref(), Some(&new)))
    }

    async fn remove_elements_from_array(
        &self,
        table: &str,
        key: &DbKey,
        attribute: &str,
        elements: &[Primitive],
        return_values: ReturnValues,
        conditions: &[AttributeCondition],
    ) -> OpResult<Option<Value>> {
        validate_elements(elements)?;
        let key_id = Self::key_id(key);
        let lock = self.write_lock(table, &key_id).await;
        let _guard = lock.lock().await;

        let Some(existing) = self.backend.read(table, &key_id).await? else {
            return Ok(None);
        };
        Self::check_conditions(key, Some(&existing.body), conditions)?;

        let mut new = existing.body.clone();
        if let Some(Value::Array(array)) = new.get_mut(attribute) {
            array.retain(|e| {
                let element = Primitive::from_json(e);
                !elements.iter().any(|needle| *needle == element)
            });
        }
        self.store(table, key, new.clone()).await?;
        Ok(self.returned(return_values, key, Some(&existing.body), Some(&new)))
    }

    async fn increment_attribute(
        &self,
        table: &str,
        key: &DbKey,
        attribute: &str,
        delta: f64,
        conditions: &[AttributeCondition],
    ) -> OpResult<f64> {
        let key_id = Self::key_id(key);
        let lock = self.write_lock(table, &key_id).await;
        let _guard = lock.lock().await;

        let existing = self.backend.read(table, &key_id).await?;
        let old = existing.map(|e| e.body);
        Self::check_conditions(key, old.as_ref(), conditions)?;

        // Missing and non-numeric both count as zero.
        let current = old
            .as_ref()
            .and_then(|b| b.get(attribute))
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        let next = current + delta;
        let number = serde_json::Number::from_f64(next)
            .ok_or_else(|| OpError::bad_request("increment result is not a finite number"))?;

        let mut new = old.clone().unwrap_or_default();
        new.insert(attribute.to_string(), Value::Number(number));
        self.store(table, key, new).await?;
        if old.is_none() {
            self.post_insert(table, &key_id).await?;
        }
        Ok(next)
    }

    async fn scan_table(&self, table: &str) -> OpResult<Vec<Value>> {
        let items = self.load_sorted(table).await?;
        Ok(items.into_iter().map(|StoredItem { key, body }| self.finish(&key, body)).collect())
    }

    async fn scan_table_with_filter(
        &self,
        table: &str,
        filter: &[AttributeCondition],
    ) -> OpResult<Vec<Value>> {
        let items = self.load_sorted(table).await?;
        Ok(items
            .into_iter()
            .filter(|item| {
                conditions::all_hold(filter, &Self::logical_item(&item.key, &item.body))
            })
            .map(|StoredItem { key, body }| self.finish(&key, body))
            .collect())
    }

    async fn scan_table_paginated(
        &self,
        table: &str,
        page_size: usize,
        page_token: Option<&str>,
    ) -> OpResult<ScanPage> {
        if page_size == 0 {
            return Err(OpError::bad_request("page size must be positive"));
        }
        let mut key_ids = self.enumerate(table).await?;
        key_ids.sort();
        let total = key_ids.len();
        let offset = match page_token {
            Some(token) => decode_page_token(token)?,
            None => 0,
        };

        let mut items = Vec::new();
        for key_id in key_ids.iter().skip(offset).take(page_size) {
            if let Some(StoredItem { key, body }) = self.backend.read(table, key_id).await? {
                items.push(self.finish(&key, body));
            }
        }
        let next = offset + page_size;
        Ok(ScanPage {
            items,
            next_page_token: (next < total).then(|| encode_page_token(next)),
            total_count: Some(total as u64),
        })
    }

    async fn drop_table(&self, table: &str) -> OpResult<()> {
        self.backend.drop_table(table).await?;
        if let Some(index) = &self.key_index {
            index.post_drop(table).await?;
        }
        debug!(table, "dropped table");
        Ok(())
    }
}

use async_trait::async_trait;
use serde_json::Value;

use crate::condition::AttributeCondition;
use crate::database::{DatabaseOptions, DbKey, ReturnValues, ScanPage};
use crate::error::OpResult;
use crate::primitive::Primitive;

/// Schemaless document store with conditional predicates, array mutation,
/// atomic increment and paginated scans.
///
/// Preconditions are evaluated against the snapshot read immediately before
/// the write; implementations make that read-modify-write atomic per key.
/// Condition lists AND-combine. Returned items always carry the key
/// attribute re-injected and the instance's [`DatabaseOptions`]
/// post-processing applied.
#[async_trait]
pub trait DatabaseService: Send + Sync {
    fn options(&self) -> DatabaseOptions;

    /// Options are per-instance and mutable at runtime.
    fn set_options(&self, options: DatabaseOptions);

    /// `Ok(true)` iff the item is present and all conditions hold;
    /// `404` when absent, `412` when present but a condition fails.
    async fn item_exists(
        &self,
        table: &str,
        key: &DbKey,
        conditions: &[AttributeCondition],
    ) -> OpResult<bool>;

    async fn get_item(&self, table: &str, key: &DbKey) -> OpResult<Option<Value>>;

    /// Missing keys are silently omitted; the result never exceeds
    /// `keys.len()` entries.
    async fn get_items(&self, table: &str, keys: &[DbKey]) -> OpResult<Vec<Value>>;

    /// Replace the item body. Without `overwrite`, an existing item is a
    /// `409` conflict.
    async fn put_item(
        &self,
        table: &str,
        key: &DbKey,
        item: &Value,
        return_values: ReturnValues,
        overwrite: bool,
    ) -> OpResult<Option<Value>>;

    /// Shallow-merge `update` over the existing body; creates the item when
    /// absent and the conditions hold against the empty document. `412` on
    /// condition violation.
    async fn update_item(
        &self,
        table: &str,
        key: &DbKey,
        update: &Value,
        return_values: ReturnValues,
        conditions: &[AttributeCondition],
    ) -> OpResult<Option<Value>>;

    /// Absent items succeed with a null payload; `412` on condition
    /// violation.
    async fn delete_item(
        &self,
        table: &str,
        key: &DbKey,
        return_values: ReturnValues,
        conditions: &[AttributeCondition],
    ) -> OpResult<Option<Value>>;

    /// Ensure the attribute is an array and append the elements; creates the
    /// item when absent. Elements must be non-empty and of one primitive
    /// kind (`400` otherwise).
    async fn add_elements_to_array(
        &self,
        table: &str,
        key: &DbKey,
        attribute: &str,
        elements: &[Primitive],
        return_values: ReturnValues,
        conditions: &[AttributeCondition],
    ) -> OpResult<Option<Value>>;

    /// Remove all occurrences of the given elements. Same input validation
    /// as [`add_elements_to_array`](Self::add_elements_to_array).
    async fn remove_elements_from_array(
        &self,
        table: &str,
        key: &DbKey,
        attribute: &str,
        elements: &[Primitive],
        return_values: ReturnValues,
        conditions: &[AttributeCondition],
    ) -> OpResult<Option<Value>>;

    /// Missing or non-numeric attributes count as zero. Returns the new
    /// value; creates the item when absent.
    async fn increment_attribute(
        &self,
        table: &str,
        key: &DbKey,
        attribute: &str,
        delta: f64,
        conditions: &[AttributeCondition],
    ) -> OpResult<f64>;

    async fn scan_table(&self, table: &str) -> OpResult<Vec<Value>>;

    /// Filter conditions AND-combine.
    async fn scan_table_with_filter(
        &self,
        table: &str,
        filter: &[AttributeCondition],
    ) -> OpResult<Vec<Value>>;

    async fn scan_table_paginated(
        &self,
        table: &str,
        page_size: usize,
        page_token: Option<&str>,
    ) -> OpResult<ScanPage>;

    async fn drop_table(&self, table: &str) -> OpResult<()>;
}

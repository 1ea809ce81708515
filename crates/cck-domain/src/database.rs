use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::primitive::Primitive;

// ── Keys ──────────────────────────────────────────────────────────────────────

/// Identifies a document within a table.
///
/// The key attribute is logically part of the item but never stored
/// redundantly in the serialized body; reads re-inject it under `name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbKey {
    pub name: String,
    pub value: Primitive,
}

impl DbKey {
    pub fn new(name: impl Into<String>, value: impl Into<Primitive>) -> Self {
        DbKey { name: name.into(), value: value.into() }
    }
}

impl std::fmt::Display for DbKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

// ── Write options ─────────────────────────────────────────────────────────────

/// Which image of the item a mutating operation hands back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnValues {
    #[default]
    DoNotReturn,
    OldValues,
    NewValues,
}

/// Per-instance post-processing applied to every returned item, mutable at
/// runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DatabaseOptions {
    /// Sort every returned JSON array deterministically by primitive order.
    pub auto_sort_arrays: bool,
    /// Render floats equal to their integer rounding as integers on return.
    pub auto_convert_roundable_float_to_int: bool,
}

// ── Pagination ────────────────────────────────────────────────────────────────

/// One page of a paginated table scan. The token is opaque to callers and
/// monotonic across pages.
#[derive(Debug, Clone)]
pub struct ScanPage {
    pub items: Vec<Value>,
    pub next_page_token: Option<String>,
    pub total_count: Option<u64>,
}

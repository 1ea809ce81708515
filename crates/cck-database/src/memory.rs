use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use cck_domain::OpResult;
use tokio::sync::RwLock;

use crate::backend::{DocumentBackend, StoredItem};

/// In-memory [`DocumentBackend`]. Tables are plain maps; key enumeration is
/// native. All data is lost on process exit.
#[derive(Debug, Clone, Default)]
pub struct MemoryDocumentBackend {
    tables: Arc<RwLock<HashMap<String, HashMap<String, StoredItem>>>>,
}

impl MemoryDocumentBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentBackend for MemoryDocumentBackend {
    async fn read(&self, table: &str, key_id: &str) -> OpResult<Option<StoredItem>> {
        let tables = self.tables.read().await;
        Ok(tables.get(table).and_then(|t| t.get(key_id).cloned()))
    }

    async fn write(&self, table: &str, key_id: &str, item: &StoredItem) -> OpResult<()> {
        let mut tables = self.tables.write().await;
        tables
            .entry(table.to_string())
            .or_default()
            .insert(key_id.to_string(), item.clone());
        Ok(())
    }

    async fn remove(&self, table: &str, key_id: &str) -> OpResult<()> {
        let mut tables = self.tables.write().await;
        if let Some(t) = tables.get_mut(table) {
            t.remove(key_id);
        }
        Ok(())
    }

    async fn native_keys(&self, table: &str) -> OpResult<Option<Vec<String>>> {
        let tables = self.tables.read().await;
        Ok(Some(
            tables.get(table).map(|t| t.keys().cloned().collect()).unwrap_or_default(),
        ))
    }

    async fn drop_table(&self, table: &str) -> OpResult<()> {
        let mut tables = self.tables.write().await;
        tables.remove(table);
        Ok(())
    }
}

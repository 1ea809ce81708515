use std::sync::Arc;

use cck_domain::{MemoryScope, MemoryService, OpResult, Primitive};

/// System scope holding per-table key lists for backends without native key
/// enumeration.
pub const TABLE_KEY_SCOPE: &str = "CrossCloudKit.Database.TableKeys";

/// Per-table list of observed item keys, kept in the memory service.
///
/// The engine calls [`post_insert`](Self::post_insert) after every write
/// that created an item and [`post_drop`](Self::post_drop) when a table is
/// dropped; scans read the list back to assemble result sets.
#[derive(Clone)]
pub struct TableKeyIndex {
    memory: Arc<dyn MemoryService>,
    scope: MemoryScope,
}

impl TableKeyIndex {
    pub fn new(memory: Arc<dyn MemoryService>) -> Self {
        TableKeyIndex { memory, scope: MemoryScope::new(TABLE_KEY_SCOPE) }
    }

    fn list_name(table: &str) -> String {
        format!("table_keys_{table}")
    }

    pub async fn post_insert(&self, table: &str, key_id: &str) -> OpResult<()> {
        self.memory
            .push_to_list_tail_if_values_not_exists(
                &self.scope,
                &Self::list_name(table),
                &[Primitive::String(key_id.to_string())],
                false,
            )
            .await?;
        Ok(())
    }

    pub async fn post_remove(&self, table: &str, key_id: &str) -> OpResult<()> {
        self.memory
            .remove_elements_from_list(
                &self.scope,
                &Self::list_name(table),
                &[Primitive::String(key_id.to_string())],
                false,
            )
            .await?;
        Ok(())
    }

    pub async fn keys(&self, table: &str) -> OpResult<Vec<String>> {
        let elements = self
            .memory
            .get_all_elements_of_list(&self.scope, &Self::list_name(table))
            .await?;
        Ok(elements
            .into_iter()
            .filter_map(|p| match p {
                Primitive::String(s) => Some(s),
                _ => None,
            })
            .collect())
    }

    pub async fn post_drop(&self, table: &str) -> OpResult<()> {
        self.memory.empty_list(&self.scope, &Self::list_name(table), false).await?;
        Ok(())
    }
}

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use base64::Engine;
use cck_domain::{OpError, OpResult};

use crate::backend::{DocumentBackend, StoredItem};

/// Filesystem [`DocumentBackend`]: one JSON file per item under
/// `<root>/<table>/`.
///
/// File names are the url-safe base64 of the key id, so arbitrary key
/// values stay path-safe. The backend deliberately reports no native key
/// enumeration; scans go through the engine's table key index, which is the
/// contract this backend exists to exercise.
#[derive(Debug, Clone)]
pub struct FsDocumentBackend {
    root: PathBuf,
}

impl FsDocumentBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsDocumentBackend { root: root.into() }
    }

    fn item_path(&self, table: &str, key_id: &str) -> PathBuf {
        let name = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(key_id.as_bytes());
        self.root.join(table).join(format!("{name}.json"))
    }

    fn table_path(&self, table: &str) -> PathBuf {
        self.root.join(table)
    }
}

fn io_error(context: &str, err: std::io::Error) -> OpError {
    match err.kind() {
        ErrorKind::PermissionDenied => OpError::forbidden(format!("{context}: {err}")),
        _ => OpError::internal(format!("{context}: {err}")),
    }
}

#[async_trait]
impl DocumentBackend for FsDocumentBackend {
    async fn read(&self, table: &str, key_id: &str) -> OpResult<Option<StoredItem>> {
        let path = self.item_path(table, key_id);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(io_error("read item", err)),
        };
        let item = serde_json::from_slice(&raw)
            .map_err(|err| OpError::internal(format!("corrupt item file {path:?}: {err}")))?;
        Ok(Some(item))
    }

    async fn write(&self, table: &str, key_id: &str, item: &StoredItem) -> OpResult<()> {
        let path = self.item_path(table, key_id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| io_error("create table dir", err))?;
        }
        let raw = serde_json::to_vec(item)
            .map_err(|err| OpError::internal(format!("serialize item: {err}")))?;
        tokio::fs::write(&path, raw).await.map_err(|err| io_error("write item", err))
    }

    async fn remove(&self, table: &str, key_id: &str) -> OpResult<()> {
        let path = self.item_path(table, key_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_error("remove item", err)),
        }
    }

    async fn native_keys(&self, _table: &str) -> OpResult<Option<Vec<String>>> {
        Ok(None)
    }

    async fn drop_table(&self, table: &str) -> OpResult<()> {
        let path = self.table_path(table);
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_error("drop table", err)),
        }
    }
}

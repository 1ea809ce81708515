use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::Path;

use cck_domain::{FileAccessibility, OpError, OpResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sidecar record persisted next to the object tree, carrying everything a
/// plain filesystem cannot: content type, tags, free-form properties, ACL
/// and the original creation instant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct SidecarRecord {
    pub content_type: Option<String>,
    #[serde(default)]
    pub properties: HashMap<String, String>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    pub accessibility: Option<FileAccessibility>,
    pub created_at: Option<DateTime<Utc>>,
}

impl SidecarRecord {
    pub async fn load(path: &Path) -> OpResult<Option<SidecarRecord>> {
        let raw = match tokio::fs::read(path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(OpError::internal(format!("read sidecar: {err}"))),
        };
        // A corrupt sidecar must not make the object unreadable.
        Ok(serde_json::from_slice(&raw).ok())
    }

    pub async fn save(&self, path: &Path) -> OpResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| OpError::internal(format!("create sidecar dir: {err}")))?;
        }
        let raw = serde_json::to_vec(self)
            .map_err(|err| OpError::internal(format!("serialize sidecar: {err}")))?;
        tokio::fs::write(path, raw)
            .await
            .map_err(|err| OpError::internal(format!("write sidecar: {err}")))
    }

    pub async fn delete(path: &Path) {
        // Best effort; a stale sidecar is harmless.
        let _ = tokio::fs::remove_file(path).await;
    }
}

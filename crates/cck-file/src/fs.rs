use std::collections::HashMap;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use cck_domain::{
    ByteRange, EventNotificationConfig, FileAccessibility, FileEvent, FileListing, FileMetadata,
    FilePayload, FileService, FileSink, ListOptions, MemoryService, OpError, OpResult,
    PubSubService, SignedUrl,
};
use cck_monitor::{FileMonitor, MonitorConfig};
use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::debug;
use uuid::Uuid;

use crate::meta::SidecarRecord;
use crate::signed::{SignedOperation, SignedUrlClaims, UrlSigner};

/// Directory under the service root holding sidecar records; bucket names
/// may not collide with it.
const META_DIR: &str = ".cck-meta";

// ── FsFileService ─────────────────────────────────────────────────────────────

/// Filesystem-backed [`FileService`].
///
/// Objects live at `<root>/<bucket>/<key>`; content type, tags, properties
/// and ACL live in sidecar records under `<root>/.cck-meta/`. The local
/// filesystem has no native change events, so notifications are synthesized
/// by a [`FileMonitor`] whose worker starts with the first registered
/// config and stops when the service is dropped or shut down.
pub struct FsFileService {
    root: PathBuf,
    monitor: Arc<FileMonitor>,
    signer: UrlSigner,
    weak_self: Weak<FsFileService>,
}

impl FsFileService {
    pub fn new(
        root: impl Into<PathBuf>,
        memory: Arc<dyn MemoryService>,
        pubsub: Arc<dyn PubSubService>,
    ) -> Arc<Self> {
        Self::with_monitor_config(root, memory, pubsub, MonitorConfig::default())
    }

    pub fn with_monitor_config(
        root: impl Into<PathBuf>,
        memory: Arc<dyn MemoryService>,
        pubsub: Arc<dyn PubSubService>,
        config: MonitorConfig,
    ) -> Arc<Self> {
        let monitor = Arc::new(FileMonitor::with_config(memory, pubsub, config));
        let mut signing_key = Vec::with_capacity(32);
        signing_key.extend_from_slice(Uuid::new_v4().as_bytes());
        signing_key.extend_from_slice(Uuid::new_v4().as_bytes());
        Arc::new_cyclic(|weak| FsFileService {
            root: root.into(),
            monitor,
            signer: UrlSigner::new(signing_key),
            weak_self: weak.clone(),
        })
    }

    pub fn monitor(&self) -> &Arc<FileMonitor> {
        &self.monitor
    }

    /// Check a URL previously issued by this instance and return what it
    /// authorizes.
    pub fn verify_signed_url(&self, url: &str) -> OpResult<SignedUrlClaims> {
        self.signer.verify(url, Utc::now())
    }

    /// Stop the notification worker and wait for it.
    pub async fn shutdown(&self) {
        self.monitor.shutdown().await;
    }

    // ── Paths ─────────────────────────────────────────────────────────────

    fn object_path(&self, bucket: &str, key: &str) -> OpResult<PathBuf> {
        check_bucket(bucket)?;
        check_key(key)?;
        Ok(self.root.join(bucket).join(key))
    }

    fn sidecar_path(&self, bucket: &str, key: &str) -> PathBuf {
        self.root.join(META_DIR).join(bucket).join(format!("{key}.json"))
    }

    async fn stat(&self, bucket: &str, key: &str) -> OpResult<std::fs::Metadata> {
        let path = self.object_path(bucket, key)?;
        tokio::fs::metadata(&path).await.map_err(|err| match err.kind() {
            ErrorKind::NotFound => OpError::not_found(format!("{bucket}/{key}")),
            _ => io_error("stat object", err),
        })
    }

    async fn collect_keys(&self, bucket_path: &Path) -> OpResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut pending = vec![bucket_path.to_path_buf()];
        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(io_error("list directory", err)),
            };
            while let Some(entry) =
                entries.next_entry().await.map_err(|err| io_error("list directory", err))?
            {
                let path = entry.path();
                let file_type =
                    entry.file_type().await.map_err(|err| io_error("list directory", err))?;
                if file_type.is_dir() {
                    pending.push(path);
                } else if file_type.is_file() {
                    if let Ok(rel) = path.strip_prefix(bucket_path) {
                        let key: Vec<&str> = rel
                            .components()
                            .filter_map(|c| c.as_os_str().to_str())
                            .collect();
                        keys.push(key.join("/"));
                    }
                }
            }
        }
        Ok(keys)
    }

    fn ensure_worker(&self) {
        if let Some(me) = self.weak_self.upgrade() {
            let service: Arc<dyn FileService> = me;
            self.monitor.start(&service, None);
        }
    }
}

// ── Validation and helpers ────────────────────────────────────────────────────

fn check_bucket(bucket: &str) -> OpResult<()> {
    if bucket.is_empty()
        || bucket.starts_with('.')
        || bucket.contains('/')
        || bucket.contains('\\')
    {
        return Err(OpError::bad_request(format!("invalid bucket name {bucket:?}")));
    }
    Ok(())
}

fn check_key(key: &str) -> OpResult<()> {
    let traversal =
        key.split('/').any(|part| part.is_empty() || part == "." || part == "..");
    if key.is_empty() || key.starts_with('/') || key.contains('\\') || traversal {
        return Err(OpError::bad_request(format!("invalid object key {key:?}")));
    }
    Ok(())
}

fn io_error(context: &str, err: std::io::Error) -> OpError {
    match err.kind() {
        ErrorKind::NotFound => OpError::not_found(format!("{context}: {err}")),
        ErrorKind::PermissionDenied => OpError::forbidden(format!("{context}: {err}")),
        ErrorKind::TimedOut | ErrorKind::Interrupted => {
            OpError::bad_gateway(format!("{context}: {err}"))
        }
        _ => OpError::internal(format!("{context}: {err}")),
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Minimal extension-based content-type detection for uploads.
fn guess_content_type(key: &str) -> Option<&'static str> {
    let ext = key.rsplit_once('.').map(|(_, ext)| ext)?;
    let ct = match ext {
        "txt" | "log" => "text/plain",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "csv" => "text/csv",
        "js" => "text/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "mp4" => "video/mp4",
        _ => return None,
    };
    Some(ct)
}

#[cfg(unix)]
async fn apply_permissions(path: &Path, accessibility: FileAccessibility) -> OpResult<()> {
    use std::os::unix::fs::PermissionsExt;
    let mode = match accessibility {
        FileAccessibility::PublicRead => 0o644,
        FileAccessibility::AuthenticatedRead | FileAccessibility::ProjectWideProtectedRead => {
            0o600
        }
    };
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .await
        .map_err(|err| io_error("set permissions", err))
}

#[cfg(not(unix))]
async fn apply_permissions(_path: &Path, _accessibility: FileAccessibility) -> OpResult<()> {
    Ok(())
}

// ── FileService impl ──────────────────────────────────────────────────────────

#[async_trait]
impl FileService for FsFileService {
    async fn upload_file(
        &self,
        payload: FilePayload,
        bucket: &str,
        key: &str,
        accessibility: Option<FileAccessibility>,
        tags: Option<&HashMap<String, String>>,
    ) -> OpResult<FileMetadata> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| io_error("create bucket dir", err))?;
        }
        match payload {
            FilePayload::Path(source) => {
                tokio::fs::copy(&source, &path)
                    .await
                    .map_err(|err| io_error("copy upload source", err))?;
            }
            FilePayload::Stream(mut reader) => {
                let mut file = tokio::fs::File::create(&path)
                    .await
                    .map_err(|err| io_error("create object", err))?;
                tokio::io::copy(&mut reader, &mut file)
                    .await
                    .map_err(|err| io_error("write object", err))?;
                file.flush().await.map_err(|err| io_error("flush object", err))?;
            }
        }

        let sidecar_path = self.sidecar_path(bucket, key);
        let mut record = SidecarRecord::load(&sidecar_path).await?.unwrap_or_default();
        if record.created_at.is_none() {
            record.created_at = Some(Utc::now());
        }
        if record.content_type.is_none() {
            record.content_type = guess_content_type(key).map(str::to_string);
        }
        if let Some(tags) = tags {
            record.tags = tags.clone();
        }
        if let Some(accessibility) = accessibility {
            record.accessibility = Some(accessibility);
            apply_permissions(&path, accessibility).await?;
        }
        record.save(&sidecar_path).await?;

        debug!(bucket, key, "uploaded object");
        self.file_metadata(bucket, key).await
    }

    async fn download_file(
        &self,
        bucket: &str,
        key: &str,
        sink: FileSink,
        range: Option<ByteRange>,
    ) -> OpResult<u64> {
        let path = self.object_path(bucket, key)?;
        let mut file = tokio::fs::File::open(&path).await.map_err(|err| match err.kind() {
            ErrorKind::NotFound => OpError::not_found(format!("{bucket}/{key}")),
            _ => io_error("open object", err),
        })?;

        let mut reader: Box<dyn AsyncRead + Send + Unpin> = match range {
            Some(range) => {
                file.seek(SeekFrom::Start(range.start))
                    .await
                    .map_err(|err| io_error("seek object", err))?;
                Box::new(file.take(range.size))
            }
            None => Box::new(file),
        };

        let written = match sink {
            FileSink::Path(destination) => {
                if let Some(parent) = destination.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|err| io_error("create download dir", err))?;
                }
                let mut out = tokio::fs::File::create(&destination)
                    .await
                    .map_err(|err| io_error("create download target", err))?;
                let n = tokio::io::copy(&mut reader, &mut out)
                    .await
                    .map_err(|err| io_error("write download", err))?;
                out.flush().await.map_err(|err| io_error("flush download", err))?;
                n
            }
            FileSink::Stream(mut writer) => {
                let n = tokio::io::copy(&mut reader, &mut writer)
                    .await
                    .map_err(|err| io_error("write download", err))?;
                writer.flush().await.map_err(|err| io_error("flush download", err))?;
                n
            }
        };
        Ok(written)
    }

    async fn copy_file(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
        accessibility: Option<FileAccessibility>,
    ) -> OpResult<FileMetadata> {
        let source = self.object_path(src_bucket, src_key)?;
        let destination = self.object_path(dst_bucket, dst_key)?;
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| io_error("create bucket dir", err))?;
        }
        tokio::fs::copy(&source, &destination).await.map_err(|err| match err.kind() {
            ErrorKind::NotFound => OpError::not_found(format!("{src_bucket}/{src_key}")),
            _ => io_error("copy object", err),
        })?;

        let mut record = SidecarRecord::load(&self.sidecar_path(src_bucket, src_key))
            .await?
            .unwrap_or_default();
        record.created_at = Some(Utc::now());
        if let Some(accessibility) = accessibility {
            record.accessibility = Some(accessibility);
            apply_permissions(&destination, accessibility).await?;
        }
        record.save(&self.sidecar_path(dst_bucket, dst_key)).await?;

        self.file_metadata(dst_bucket, dst_key).await
    }

    async fn delete_file(&self, bucket: &str, key: &str) -> OpResult<()> {
        let path = self.object_path(bucket, key)?;
        tokio::fs::remove_file(&path).await.map_err(|err| match err.kind() {
            ErrorKind::NotFound => OpError::not_found(format!("{bucket}/{key}")),
            _ => io_error("delete object", err),
        })?;
        SidecarRecord::delete(&self.sidecar_path(bucket, key)).await;
        debug!(bucket, key, "deleted object");
        Ok(())
    }

    async fn delete_folder(&self, bucket: &str, folder_prefix: &str) -> OpResult<u64> {
        check_bucket(bucket)?;
        let bucket_path = self.root.join(bucket);
        let keys = self.collect_keys(&bucket_path).await?;
        let mut removed = 0u64;
        for key in keys.iter().filter(|k| k.starts_with(folder_prefix)) {
            self.delete_file(bucket, key).await?;
            removed += 1;
        }
        Ok(removed)
    }

    async fn file_exists(&self, bucket: &str, key: &str) -> OpResult<bool> {
        let path = self.object_path(bucket, key)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(io_error("stat object", err)),
        }
    }

    async fn file_size(&self, bucket: &str, key: &str) -> OpResult<u64> {
        Ok(self.stat(bucket, key).await?.len())
    }

    async fn file_checksum(&self, bucket: &str, key: &str) -> OpResult<String> {
        let path = self.object_path(bucket, key)?;
        let mut file = tokio::fs::File::open(&path).await.map_err(|err| match err.kind() {
            ErrorKind::NotFound => OpError::not_found(format!("{bucket}/{key}")),
            _ => io_error("open object", err),
        })?;
        let mut hasher = Md5::new();
        let mut buffer = vec![0u8; 64 * 1024];
        loop {
            let n = file
                .read(&mut buffer)
                .await
                .map_err(|err| io_error("read object", err))?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }
        Ok(hex(&hasher.finalize()))
    }

    async fn file_metadata(&self, bucket: &str, key: &str) -> OpResult<FileMetadata> {
        let stat = self.stat(bucket, key).await?;
        let sidecar = SidecarRecord::load(&self.sidecar_path(bucket, key))
            .await?
            .unwrap_or_default();
        let checksum = self.file_checksum(bucket, key).await.ok();
        Ok(FileMetadata {
            size: stat.len(),
            checksum,
            content_type: sidecar.content_type,
            created_at: sidecar.created_at,
            last_modified: stat.modified().ok().map(DateTime::<Utc>::from),
            properties: sidecar.properties,
            tags: sidecar.tags,
        })
    }

    async fn set_file_tags(
        &self,
        bucket: &str,
        key: &str,
        tags: &HashMap<String, String>,
    ) -> OpResult<()> {
        self.stat(bucket, key).await?;
        let sidecar_path = self.sidecar_path(bucket, key);
        let mut record = SidecarRecord::load(&sidecar_path).await?.unwrap_or_default();
        record.tags = tags.clone();
        record.save(&sidecar_path).await
    }

    async fn set_file_accessibility(
        &self,
        bucket: &str,
        key: &str,
        accessibility: FileAccessibility,
    ) -> OpResult<()> {
        self.stat(bucket, key).await?;
        let path = self.object_path(bucket, key)?;
        apply_permissions(&path, accessibility).await?;
        let sidecar_path = self.sidecar_path(bucket, key);
        let mut record = SidecarRecord::load(&sidecar_path).await?.unwrap_or_default();
        record.accessibility = Some(accessibility);
        record.save(&sidecar_path).await
    }

    async fn create_signed_upload_url(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<&str>,
        valid_for: Duration,
    ) -> OpResult<SignedUrl> {
        check_bucket(bucket)?;
        check_key(key)?;
        let expires_at = Utc::now()
            + chrono::Duration::from_std(valid_for)
                .map_err(|_| OpError::bad_request("validity window out of range"))?;
        Ok(self.signer.issue(SignedOperation::Upload, bucket, key, expires_at, content_type))
    }

    async fn create_signed_download_url(
        &self,
        bucket: &str,
        key: &str,
        valid_for: Duration,
    ) -> OpResult<SignedUrl> {
        self.stat(bucket, key).await?;
        let expires_at = Utc::now()
            + chrono::Duration::from_std(valid_for)
                .map_err(|_| OpError::bad_request("validity window out of range"))?;
        Ok(self.signer.issue(SignedOperation::Download, bucket, key, expires_at, None))
    }

    async fn list_files(&self, bucket: &str, options: ListOptions) -> OpResult<FileListing> {
        check_bucket(bucket)?;
        let bucket_path = self.root.join(bucket);
        let mut keys = self.collect_keys(&bucket_path).await?;
        keys.sort();
        if let Some(prefix) = &options.prefix {
            keys.retain(|k| k.starts_with(prefix.as_str()));
        }
        if let Some(token) = &options.continuation_token {
            let after = decode_list_token(token)?;
            keys.retain(|k| k.as_str() > after.as_str());
        }

        let mut next_continuation_token = None;
        if let Some(max) = options.max_results {
            if max == 0 {
                return Err(OpError::bad_request("max_results must be positive"));
            }
            if keys.len() > max {
                keys.truncate(max);
                next_continuation_token = keys.last().map(|k| encode_list_token(k));
            }
        }
        Ok(FileListing { file_keys: keys, next_continuation_token })
    }

    async fn create_notification(
        &self,
        bucket: &str,
        topic: &str,
        path_prefix: &str,
        events: &[FileEvent],
    ) -> OpResult<()> {
        check_bucket(bucket)?;
        if events.is_empty() {
            return Err(OpError::bad_request("at least one event type is required"));
        }
        let config =
            EventNotificationConfig::new(bucket, topic, path_prefix, events.iter().copied());
        self.monitor.create_notification(&config).await?;
        self.ensure_worker();
        Ok(())
    }

    async fn delete_notifications(&self, bucket: &str, topic: Option<&str>) -> OpResult<u64> {
        check_bucket(bucket)?;
        self.monitor.delete_notifications(bucket, topic).await
    }

    async fn cleanup_bucket(&self, bucket: &str) -> OpResult<()> {
        check_bucket(bucket)?;
        self.monitor.cleanup_bucket(bucket).await
    }
}

fn encode_list_token(key: &str) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(key.as_bytes())
}

fn decode_list_token(token: &str) -> OpResult<String> {
    base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(token.as_bytes())
        .ok()
        .and_then(|raw| String::from_utf8(raw).ok())
        .ok_or_else(|| OpError::bad_request("malformed continuation token"))
}

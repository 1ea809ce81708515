use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::OpResult;
use crate::file::{
    ByteRange, FileAccessibility, FileEvent, FileListing, FileMetadata, FilePayload, FileSink,
    ListOptions, SignedUrl,
};

/// Bucket object CRUD with metadata, tags, ACL, signed URLs, listing and
/// native-or-synthesized change notifications.
#[async_trait]
pub trait FileService: Send + Sync {
    async fn upload_file(
        &self,
        payload: FilePayload,
        bucket: &str,
        key: &str,
        accessibility: Option<FileAccessibility>,
        tags: Option<&HashMap<String, String>>,
    ) -> OpResult<FileMetadata>;

    /// Returns the number of bytes written to the sink.
    async fn download_file(
        &self,
        bucket: &str,
        key: &str,
        sink: FileSink,
        range: Option<ByteRange>,
    ) -> OpResult<u64>;

    async fn copy_file(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
        accessibility: Option<FileAccessibility>,
    ) -> OpResult<FileMetadata>;

    async fn delete_file(&self, bucket: &str, key: &str) -> OpResult<()>;

    /// Deletes every object under the prefix; returns the number removed.
    async fn delete_folder(&self, bucket: &str, folder_prefix: &str) -> OpResult<u64>;

    async fn file_exists(&self, bucket: &str, key: &str) -> OpResult<bool>;

    async fn file_size(&self, bucket: &str, key: &str) -> OpResult<u64>;

    /// MD5 hex digest (ETag-equivalent).
    async fn file_checksum(&self, bucket: &str, key: &str) -> OpResult<String>;

    async fn file_metadata(&self, bucket: &str, key: &str) -> OpResult<FileMetadata>;

    async fn set_file_tags(
        &self,
        bucket: &str,
        key: &str,
        tags: &HashMap<String, String>,
    ) -> OpResult<()>;

    async fn set_file_accessibility(
        &self,
        bucket: &str,
        key: &str,
        accessibility: FileAccessibility,
    ) -> OpResult<()>;

    async fn create_signed_upload_url(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<&str>,
        valid_for: Duration,
    ) -> OpResult<SignedUrl>;

    async fn create_signed_download_url(
        &self,
        bucket: &str,
        key: &str,
        valid_for: Duration,
    ) -> OpResult<SignedUrl>;

    async fn list_files(&self, bucket: &str, options: ListOptions) -> OpResult<FileListing>;

    // ── Notifications ─────────────────────────────────────────────────────

    /// Register a `(bucket, topic, prefix, events)` notification config.
    /// Registration is idempotent by value.
    async fn create_notification(
        &self,
        bucket: &str,
        topic: &str,
        path_prefix: &str,
        events: &[FileEvent],
    ) -> OpResult<()>;

    /// Remove configs for the bucket (all topics, or one); returns the
    /// number removed.
    async fn delete_notifications(&self, bucket: &str, topic: Option<&str>) -> OpResult<u64>;

    /// Drop the change-detection baseline for the bucket. Registered
    /// configs are untouched.
    async fn cleanup_bucket(&self, bucket: &str) -> OpResult<()>;
}

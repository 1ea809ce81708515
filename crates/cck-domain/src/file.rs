use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};

// ── File events ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FileEvent {
    Uploaded,
    Deleted,
}

impl std::fmt::Display for FileEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileEvent::Uploaded => write!(f, "Uploaded"),
            FileEvent::Deleted => write!(f, "Deleted"),
        }
    }
}

/// Keyword-based detection for provider-wrapped notification bodies.
///
/// Backends with native event hooks deliver messages in their own envelope;
/// the kind is recognized from well-known substrings and may then be
/// normalized into a [`BucketEventMessage`].
pub fn parse_native_event_kind(body: &str) -> Option<FileEvent> {
    const UPLOAD_MARKERS: [&str; 3] = ["Uploaded", "ObjectCreated", "OBJECT_FINALIZE"];
    const DELETE_MARKERS: [&str; 3] = ["Deleted", "ObjectRemoved", "OBJECT_DELETE"];

    if UPLOAD_MARKERS.iter().any(|m| body.contains(m)) {
        return Some(FileEvent::Uploaded);
    }
    if DELETE_MARKERS.iter().any(|m| body.contains(m)) {
        return Some(FileEvent::Deleted);
    }
    None
}

// ── Notification config ───────────────────────────────────────────────────────

/// One registered `(bucket, topic, prefix, events)` subscription for
/// synthesized bucket-event dispatch.
///
/// Equality is by full value; the event set is ordered so the serialized
/// form is canonical and duplicate registrations compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventNotificationConfig {
    pub topic_name: String,
    pub bucket_name: String,
    pub path_prefix: String,
    pub event_types: BTreeSet<FileEvent>,
}

impl EventNotificationConfig {
    pub fn new(
        bucket_name: impl Into<String>,
        topic_name: impl Into<String>,
        path_prefix: impl Into<String>,
        event_types: impl IntoIterator<Item = FileEvent>,
    ) -> Self {
        EventNotificationConfig {
            topic_name: topic_name.into(),
            bucket_name: bucket_name.into(),
            path_prefix: path_prefix.into(),
            event_types: event_types.into_iter().collect(),
        }
    }

    /// Canonical wire form used for value-equality in the registry list.
    pub fn to_wire(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn from_wire(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }
}

// ── File state snapshot ───────────────────────────────────────────────────────

/// Minimum per-object record needed for differential change detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileState {
    pub file_key: String,
    pub last_modified: Option<DateTime<Utc>>,
    pub size: u64,
    pub exists: bool,
}

impl FileState {
    /// Compares `(last_modified, size)` always and `exists` only when
    /// `check_exists` is set. Modification detection for upload events runs
    /// with `check_exists = false`.
    pub fn same_as(&self, other: &FileState, check_exists: bool) -> bool {
        if check_exists && self.exists != other.exists {
            return false;
        }
        self.last_modified == other.last_modified && self.size == other.size
    }

    pub fn to_wire(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn from_wire(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }
}

// ── Synthesized notification message ──────────────────────────────────────────

/// The JSON message published to a config's topic for each detected change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketEventMessage {
    pub bucket: String,
    pub key: String,
    pub event_type: FileEvent,
    /// ISO-8601 UTC with offset.
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

// ── File metadata ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileMetadata {
    pub size: u64,
    pub checksum: Option<String>,
    pub content_type: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub last_modified: Option<DateTime<Utc>>,
    pub properties: HashMap<String, String>,
    pub tags: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileAccessibility {
    AuthenticatedRead,
    ProjectWideProtectedRead,
    PublicRead,
}

impl std::fmt::Display for FileAccessibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileAccessibility::AuthenticatedRead => write!(f, "authenticated_read"),
            FileAccessibility::ProjectWideProtectedRead => write!(f, "project_wide_protected_read"),
            FileAccessibility::PublicRead => write!(f, "public_read"),
        }
    }
}

// ── Transfer payloads ─────────────────────────────────────────────────────────

/// Upload source: a local path or an async byte stream.
pub enum FilePayload {
    Path(PathBuf),
    Stream(Box<dyn AsyncRead + Send + Unpin>),
}

impl std::fmt::Debug for FilePayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilePayload::Path(p) => f.debug_tuple("Path").field(p).finish(),
            FilePayload::Stream(_) => f.debug_tuple("Stream").field(&"<reader>").finish(),
        }
    }
}

/// Download destination: a local path or an async byte sink.
pub enum FileSink {
    Path(PathBuf),
    Stream(Box<dyn AsyncWrite + Send + Unpin>),
}

impl std::fmt::Debug for FileSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileSink::Path(p) => f.debug_tuple("Path").field(p).finish(),
            FileSink::Stream(_) => f.debug_tuple("Stream").field(&"<writer>").finish(),
        }
    }
}

/// Optional byte window applied to a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub size: u64,
}

// ── Listing ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub prefix: Option<String>,
    pub max_results: Option<usize>,
    pub continuation_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FileListing {
    pub file_keys: Vec<String>,
    pub next_continuation_token: Option<String>,
}

// ── Signed URLs ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

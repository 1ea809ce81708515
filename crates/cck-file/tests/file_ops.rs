use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use cck_domain::{
    ByteRange, FileAccessibility, FilePayload, FileService, FileSink, ListOptions,
    MemoryService, PubSubService,
};
use cck_file::{FsFileService, SignedOperation};
use cck_memory::InMemoryMemoryService;
use cck_pubsub::InMemoryPubSubService;
use tokio::io::AsyncReadExt;

fn service(root: &std::path::Path) -> Arc<FsFileService> {
    let memory: Arc<dyn MemoryService> = Arc::new(InMemoryMemoryService::new());
    let pubsub: Arc<dyn PubSubService> = Arc::new(InMemoryPubSubService::new());
    FsFileService::new(root, memory, pubsub)
}

fn payload(content: &str) -> FilePayload {
    FilePayload::Stream(Box::new(Cursor::new(content.as_bytes().to_vec())))
}

async fn upload(svc: &FsFileService, bucket: &str, key: &str, content: &str) {
    svc.upload_file(payload(content), bucket, key, None, None).await.expect("upload");
}

#[tokio::test]
async fn upload_then_stat_and_checksum() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(dir.path());

    let meta = svc
        .upload_file(payload("hello"), "b", "p/x.txt", None, None)
        .await
        .unwrap();
    assert_eq!(meta.size, 5);
    assert_eq!(meta.content_type.as_deref(), Some("text/plain"));
    assert!(meta.last_modified.is_some());

    assert!(svc.file_exists("b", "p/x.txt").await.unwrap());
    assert_eq!(svc.file_size("b", "p/x.txt").await.unwrap(), 5);
    // md5("hello")
    assert_eq!(
        svc.file_checksum("b", "p/x.txt").await.unwrap(),
        "5d41402abc4b2a76b9719d911017c592"
    );
}

#[tokio::test]
async fn upload_from_a_local_path() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(dir.path());

    let source = dir.path().join("source.bin");
    tokio::fs::write(&source, b"payload").await.unwrap();

    let meta = svc
        .upload_file(FilePayload::Path(source), "b", "k", None, None)
        .await
        .unwrap();
    assert_eq!(meta.size, 7);
}

#[tokio::test]
async fn download_to_path_and_stream_with_range() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(dir.path());
    upload(&svc, "b", "k", "hello world").await;

    let target = dir.path().join("out.txt");
    let n = svc
        .download_file("b", "k", FileSink::Path(target.clone()), None)
        .await
        .unwrap();
    assert_eq!(n, 11);
    assert_eq!(tokio::fs::read_to_string(&target).await.unwrap(), "hello world");

    let (writer, mut reader) = tokio::io::duplex(64 * 1024);
    let n = svc
        .download_file(
            "b",
            "k",
            FileSink::Stream(Box::new(writer)),
            Some(ByteRange { start: 6, size: 5 }),
        )
        .await
        .unwrap();
    assert_eq!(n, 5);
    let mut ranged = String::new();
    reader.read_to_string(&mut ranged).await.unwrap();
    assert_eq!(ranged, "world");
}

#[tokio::test]
async fn download_of_missing_object_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(dir.path());
    let err = svc
        .download_file("b", "ghost", FileSink::Path(dir.path().join("out")), None)
        .await
        .unwrap_err();
    assert_eq!(err.status(), 404);
}

#[tokio::test]
async fn copy_preserves_content_and_applies_acl() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(dir.path());
    upload(&svc, "b", "src.txt", "data").await;

    let meta = svc
        .copy_file("b", "src.txt", "b2", "dst.txt", Some(FileAccessibility::PublicRead))
        .await
        .unwrap();
    assert_eq!(meta.size, 4);
    assert_eq!(
        svc.file_checksum("b", "src.txt").await.unwrap(),
        svc.file_checksum("b2", "dst.txt").await.unwrap()
    );
}

#[tokio::test]
async fn delete_file_and_folder() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(dir.path());
    upload(&svc, "b", "p/a", "1").await;
    upload(&svc, "b", "p/b", "2").await;
    upload(&svc, "b", "q/c", "3").await;

    svc.delete_file("b", "q/c").await.unwrap();
    assert_eq!(svc.delete_file("b", "q/c").await.unwrap_err().status(), 404);

    let removed = svc.delete_folder("b", "p/").await.unwrap();
    assert_eq!(removed, 2);
    assert!(!svc.file_exists("b", "p/a").await.unwrap());
}

#[tokio::test]
async fn tags_round_trip_through_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(dir.path());
    upload(&svc, "b", "k", "x").await;

    let mut tags = HashMap::new();
    tags.insert("env".to_string(), "prod".to_string());
    svc.set_file_tags("b", "k", &tags).await.unwrap();

    let meta = svc.file_metadata("b", "k").await.unwrap();
    assert_eq!(meta.tags.get("env").map(String::as_str), Some("prod"));

    // Tagging a missing object fails cleanly.
    assert_eq!(svc.set_file_tags("b", "ghost", &tags).await.unwrap_err().status(), 404);
}

#[cfg(unix)]
#[tokio::test]
async fn accessibility_shapes_unix_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let svc = service(dir.path());
    upload(&svc, "b", "k", "x").await;

    svc.set_file_accessibility("b", "k", FileAccessibility::PublicRead).await.unwrap();
    let mode = std::fs::metadata(dir.path().join("b/k")).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o644);

    svc.set_file_accessibility("b", "k", FileAccessibility::AuthenticatedRead).await.unwrap();
    let mode = std::fs::metadata(dir.path().join("b/k")).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[tokio::test]
async fn listing_supports_prefix_and_continuation() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(dir.path());
    for key in ["a.txt", "p/1", "p/2", "p/3", "z.txt"] {
        upload(&svc, "b", key, "x").await;
    }

    let all = svc.list_files("b", ListOptions::default()).await.unwrap();
    assert_eq!(all.file_keys, vec!["a.txt", "p/1", "p/2", "p/3", "z.txt"]);
    assert!(all.next_continuation_token.is_none());

    let prefixed = svc
        .list_files("b", ListOptions { prefix: Some("p/".into()), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(prefixed.file_keys, vec!["p/1", "p/2", "p/3"]);

    // Page through with max_results = 2.
    let first = svc
        .list_files("b", ListOptions { max_results: Some(2), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(first.file_keys, vec!["a.txt", "p/1"]);
    let token = first.next_continuation_token.expect("more pages");

    let second = svc
        .list_files(
            "b",
            ListOptions {
                max_results: Some(2),
                continuation_token: Some(token),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(second.file_keys, vec!["p/2", "p/3"]);
    let token = second.next_continuation_token.expect("one more page");

    let last = svc
        .list_files(
            "b",
            ListOptions {
                max_results: Some(2),
                continuation_token: Some(token),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(last.file_keys, vec!["z.txt"]);
    assert!(last.next_continuation_token.is_none());
}

#[tokio::test]
async fn signed_urls_verify_and_expire() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(dir.path());
    upload(&svc, "b", "k", "x").await;

    let url = svc
        .create_signed_download_url("b", "k", Duration::from_secs(60))
        .await
        .unwrap();
    let claims = svc.verify_signed_url(&url.url).unwrap();
    assert_eq!(claims.operation, SignedOperation::Download);
    assert_eq!(claims.bucket, "b");
    assert_eq!(claims.key, "k");

    // Download URLs require the object to exist; upload URLs do not.
    assert_eq!(
        svc.create_signed_download_url("b", "ghost", Duration::from_secs(60))
            .await
            .unwrap_err()
            .status(),
        404
    );
    let upload_url = svc
        .create_signed_upload_url("b", "new-object", Some("text/plain"), Duration::from_secs(60))
        .await
        .unwrap();
    let claims = svc.verify_signed_url(&upload_url.url).unwrap();
    assert_eq!(claims.operation, SignedOperation::Upload);
    assert_eq!(claims.content_type.as_deref(), Some("text/plain"));
}

#[tokio::test]
async fn invalid_names_are_rejected_up_front() {
    let dir = tempfile::tempdir().unwrap();
    let svc = service(dir.path());

    assert_eq!(
        svc.file_exists(".cck-meta", "k").await.unwrap_err().status(),
        400,
        "metadata directory must not be addressable as a bucket"
    );
    assert_eq!(svc.file_exists("b", "../escape").await.unwrap_err().status(), 400);
}

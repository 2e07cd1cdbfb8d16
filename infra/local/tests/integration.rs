use mstore_local::*;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

#[derive(Debug, Default)]
struct RecordingObserver {
    debug: Mutex<Vec<String>>,
    error: Mutex<Vec<String>>,
}

impl StorageObserver for RecordingObserver {
    fn debug(&self, message: fmt::Arguments<'_>) {
        self.debug.lock().unwrap().push(message.to_string());
    }

    fn error(&self, message: fmt::Arguments<'_>) {
        self.error.lock().unwrap().push(message.to_string());
    }
}

fn storage(root: &Path) -> LocalStorage {
    LocalStorage::builder().base_directory(root).build().unwrap()
}

fn observed(root: &Path) -> (LocalStorage, Arc<RecordingObserver>) {
    let observer = Arc::new(RecordingObserver::default());
    let storage =
        LocalStorage::builder().base_directory(root).observer(observer.clone()).build().unwrap();
    (storage, observer)
}

#[tokio::test]
async fn test_write_read_roundtrip() {
    let temp = TempDir::new().unwrap();
    let storage = storage(temp.path());

    let locator = storage.write("some data", &PlacementOptions::named("test.txt")).await.unwrap();
    assert_eq!(locator, "file://test.txt");

    let data = storage.read(&locator, Encoding::Utf8).await.unwrap();
    assert_eq!(data, Payload::Text("some data".to_owned()));
}

#[tokio::test]
async fn test_binary_read_and_invalid_utf8() {
    let temp = TempDir::new().unwrap();
    let storage = storage(temp.path());

    let payload = [0u8, 159, 146, 150];
    let locator = storage.write(payload, &PlacementOptions::named("blob.bin")).await.unwrap();

    let data = storage.read(&locator, Encoding::Binary).await.unwrap();
    assert_eq!(data.as_bytes(), &payload);

    let err = storage.read(&locator, Encoding::Utf8).await.expect_err("expected error");
    assert!(matches!(err, StorageError::InvalidEncoding { .. }), "unexpected error: {err:?}");
}

#[tokio::test]
async fn test_write_creates_missing_directories() {
    let temp = TempDir::new().unwrap();
    let (storage, observer) = observed(temp.path());

    let options = PlacementOptions::named("deep.txt").path("/a/b/c/");
    let locator = storage.write("nested", &options).await.unwrap();

    assert_eq!(locator, "file://a/b/c/deep.txt");
    assert!(temp.path().join("a/b/c/deep.txt").is_file());
    assert!(observer.debug.lock().unwrap().iter().any(|m| m.starts_with("Creating directory")));

    // Second write into the existing chain must not fail.
    storage.write("again", &PlacementOptions::named("other.txt").path("a/b/c")).await.unwrap();
}

#[tokio::test]
async fn test_write_without_directory_creation_leaves_nothing() {
    let temp = TempDir::new().unwrap();
    let storage = LocalStorage::builder()
        .base_directory(temp.path())
        .create_directories(false)
        .build()
        .unwrap();

    let err = storage
        .write("data", &PlacementOptions::named("file.txt").path("missing"))
        .await
        .expect_err("expected error");
    assert!(matches!(err, StorageError::WriteFailed { .. }), "unexpected error: {err:?}");
    assert!(!temp.path().join("missing").exists());
}

#[tokio::test]
async fn test_directory_creation_failure_is_reported() {
    let temp = TempDir::new().unwrap();
    let storage = storage(temp.path());
    std::fs::write(temp.path().join("blocker"), b"not a directory").unwrap();

    let err = storage
        .write("data", &PlacementOptions::named("file.txt").path("blocker/sub"))
        .await
        .expect_err("expected error");
    assert!(matches!(err, StorageError::DirectoryCreateFailed { .. }), "unexpected error: {err:?}");

    let err = storage
        .write_stream(&PlacementOptions::named("file.txt").path("blocker/sub"))
        .await
        .expect_err("expected error");
    assert!(matches!(err, StorageError::DirectoryCreateFailed { .. }), "unexpected error: {err:?}");
}

#[tokio::test]
async fn test_file_as_parent_fails_directory_creation() {
    let temp = TempDir::new().unwrap();
    let storage = storage(temp.path());
    std::fs::write(temp.path().join("blocker"), b"not a directory").unwrap();

    let options = PlacementOptions::named("x.txt").path("blocker");
    let err = storage.write("data", &options).await.expect_err("expected error");
    assert!(matches!(err, StorageError::DirectoryCreateFailed { .. }), "unexpected error: {err:?}");

    let err = storage.write_stream(&options).await.expect_err("expected error");
    assert!(matches!(err, StorageError::DirectoryCreateFailed { .. }), "unexpected error: {err:?}");
    assert!(temp.path().join("blocker").is_file());
}

#[tokio::test]
async fn test_write_stream_without_parent_fails_before_streaming() {
    let temp = TempDir::new().unwrap();
    let storage = LocalStorage::builder()
        .base_directory(temp.path())
        .create_directories(false)
        .build()
        .unwrap();

    let err = storage
        .write_stream(&PlacementOptions::named("file.txt").path("missing"))
        .await
        .expect_err("expected error");
    assert!(matches!(err, StorageError::WriteFailed { .. }), "unexpected error: {err:?}");
    assert!(!temp.path().join("missing").exists());
    assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_write_stores_bytes_regardless_of_encoding() {
    let temp = TempDir::new().unwrap();
    let storage = storage(temp.path());

    let payload = [0xffu8, 0x00, 0x41];
    let options = PlacementOptions::named("raw.bin").encoding(Encoding::Utf8);
    storage.write(payload, &options).await.unwrap();

    assert_eq!(std::fs::read(temp.path().join("raw.bin")).unwrap(), payload);
}

#[tokio::test]
async fn test_flattened_write() {
    let temp = TempDir::new().unwrap();
    let storage = LocalStorage::builder()
        .base_directory(temp.path())
        .flatten_directories(true)
        .build()
        .unwrap();

    let locator =
        storage.write("flat", &PlacementOptions::named("n.txt").path("dir1/dir2")).await.unwrap();
    assert_eq!(locator, "file://dir1-dir2-n.txt");
    assert!(temp.path().join("dir1-dir2-n.txt").is_file());

    // The flattening policy is applied again when resolving.
    let data = storage.read("file://dir1/dir2-n.txt", Encoding::Utf8).await.unwrap();
    assert_eq!(data.as_text(), Some("flat"));
}

#[tokio::test]
async fn test_call_level_flatten_override_reads_through_provider_policy() {
    let temp = TempDir::new().unwrap();
    let storage = LocalStorage::builder()
        .base_directory(temp.path())
        .flatten_directories(true)
        .build()
        .unwrap();

    let options = PlacementOptions::named("n.txt").path("a").flatten(false);
    let locator = storage.write("nested", &options).await.unwrap();
    assert_eq!(locator, "file://a/n.txt");
    assert!(temp.path().join("a/n.txt").is_file());

    // Reads apply the provider's flattening, so the nested locator maps to a-n.txt.
    let err = storage.read(&locator, Encoding::Utf8).await.expect_err("expected error");
    assert!(err.is_not_found(), "unexpected error: {err:?}");
    assert_eq!(storage.file_path_for_url(&locator), Some(temp.path().join("a-n.txt")));
}

#[tokio::test]
async fn test_spaces_roundtrip_through_locator() {
    let temp = TempDir::new().unwrap();
    let storage = storage(temp.path());

    let locator = storage
        .write("spaced", &PlacementOptions::named("my file.txt").path("my dir"))
        .await
        .unwrap();
    assert_eq!(locator, "file://my%20dir/my%20file.txt");
    assert!(temp.path().join("my dir/my file.txt").is_file());
    assert_eq!(storage.read(&locator, Encoding::Utf8).await.unwrap().as_text(), Some("spaced"));
}

#[tokio::test]
async fn test_unsupported_scheme_is_rejected() {
    let temp = TempDir::new().unwrap();
    let storage = storage(temp.path());

    let err = storage.read("other://test.txt", Encoding::Utf8).await.expect_err("expected error");
    assert!(matches!(err, StorageError::UnsupportedScheme { .. }), "unexpected error: {err:?}");

    let err = storage.read_stream("other://test.txt").await.expect_err("expected error");
    assert!(matches!(err, StorageError::UnsupportedScheme { .. }), "unexpected error: {err:?}");

    let err = storage.delete("other://test.txt").await.expect_err("expected error");
    assert!(matches!(err, StorageError::UnsupportedScheme { .. }), "unexpected error: {err:?}");
}

#[tokio::test]
async fn test_read_missing_returns_not_found() {
    let temp = TempDir::new().unwrap();
    let storage = storage(temp.path());

    let err =
        storage.read("file://missing.bin", Encoding::Binary).await.expect_err("expected error");
    assert!(err.is_not_found(), "unexpected error: {err:?}");

    let err = storage.read_stream("file://missing.bin").await.expect_err("expected error");
    assert!(err.is_not_found(), "unexpected error: {err:?}");

    std::fs::create_dir(temp.path().join("folder")).unwrap();
    let err = storage.read("file://folder", Encoding::Binary).await.expect_err("expected error");
    assert!(err.is_not_found(), "unexpected error: {err:?}");
}

#[tokio::test]
async fn test_traversal_is_rejected() {
    let temp = TempDir::new().unwrap();
    let storage = storage(temp.path());

    let err = storage
        .write("x", &PlacementOptions::named("escape.txt").path("../.."))
        .await
        .expect_err("expected error");
    assert!(matches!(err, StorageError::PathTraversalAttempt { .. }), "unexpected error: {err:?}");

    let err =
        storage.read("file://../etc/passwd", Encoding::Utf8).await.expect_err("expected error");
    assert!(matches!(err, StorageError::InvalidLocator { .. }), "unexpected error: {err:?}");
}

#[tokio::test]
async fn test_delete_and_idempotence() {
    let temp = TempDir::new().unwrap();
    let (storage, observer) = observed(temp.path());

    let locator = storage.write("x", &PlacementOptions::named("tmp/file.txt")).await.unwrap();
    let path = storage.resolve(&locator).unwrap();
    assert!(path.is_file());

    storage.delete(&locator).await.unwrap();
    assert!(!path.exists());

    storage.delete(&locator).await.unwrap();
    storage.delete("file://never/existed.txt").await.unwrap();
    assert_eq!(
        observer.debug.lock().unwrap().iter().filter(|m| m.contains("nothing to delete")).count(),
        2
    );
}

#[tokio::test]
async fn test_read_stream_yields_content() {
    let temp = TempDir::new().unwrap();
    let storage = storage(temp.path());

    let payload: Vec<u8> = (0..64 * 1024).map(|i| u8::try_from(i % 251).unwrap()).collect();
    let locator = storage.write(&payload, &PlacementOptions::named("big.bin")).await.unwrap();

    let mut stream = storage.read_stream(&locator).await.unwrap();
    assert_eq!(stream.path(), temp.path().join("big.bin"));
    let mut data = Vec::new();
    stream.read_to_end(&mut data).await.unwrap();
    assert_eq!(data, payload);
}

#[tokio::test]
async fn test_write_stream_roundtrip() {
    let temp = TempDir::new().unwrap();
    let (storage, observer) = observed(temp.path());

    let mut stream =
        storage.write_stream(&PlacementOptions::named("log.txt").path("x/y")).await.unwrap();
    assert_eq!(stream.locator(), &"file://x/y/log.txt");
    assert!(temp.path().join("x/y/log.txt").is_file(), "target is opened up front");

    stream.write_all(b"hello ").await.unwrap();
    stream.write_all(b"world").await.unwrap();
    assert_eq!(stream.bytes_written(), 11);

    let locator = stream.finish().await.unwrap();
    let data = storage.read(&locator, Encoding::Utf8).await.unwrap();
    assert_eq!(data.as_text(), Some("hello world"));
    assert!(observer.debug.lock().unwrap().iter().any(|m| m.ends_with("after writing 11 bytes")));
}

#[tokio::test]
async fn test_write_stream_shutdown_then_finish() {
    let temp = TempDir::new().unwrap();
    let storage = storage(temp.path());

    let mut stream = storage.write_stream(&PlacementOptions::named("s.txt")).await.unwrap();
    stream.write_all(b"data").await.unwrap();
    stream.shutdown().await.unwrap();

    let err = stream.write_all(b"late").await.expect_err("expected error");
    assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe);

    let locator = stream.finish().await.unwrap();
    assert_eq!(storage.read(&locator, Encoding::Utf8).await.unwrap().as_text(), Some("data"));
}

#[tokio::test]
async fn test_write_stream_abort_removes_file() {
    let temp = TempDir::new().unwrap();
    let storage = storage(temp.path());

    let mut stream = storage.write_stream(&PlacementOptions::named("partial.txt")).await.unwrap();
    stream.write_all(b"half of it").await.unwrap();
    let path = stream.path().to_path_buf();
    stream.abort().await.unwrap();

    assert!(!path.exists());
}

#[cfg(target_os = "linux")]
mod faults {
    use super::*;

    /// Places a symlink to `/dev/full` at the target so every flush fails with `ENOSPC`.
    fn full_device_target(root: &Path, name: &str) -> Option<std::path::PathBuf> {
        let device = Path::new("/dev/full");
        if !device.exists() {
            return None;
        }
        let target = root.join(name);
        std::os::unix::fs::symlink(device, &target).unwrap();
        Some(target)
    }

    #[tokio::test]
    async fn test_failed_write_removes_partial_file() {
        let temp = TempDir::new().unwrap();
        let storage = storage(temp.path());
        let Some(target) = full_device_target(temp.path(), "full.bin") else { return };

        let err = storage
            .write(vec![7u8; 8192], &PlacementOptions::named("full.bin"))
            .await
            .expect_err("expected error");
        match err {
            StorageError::WriteFailed { cleanup, .. } => assert!(cleanup.is_none()),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(std::fs::symlink_metadata(&target).is_err());
    }

    #[tokio::test]
    async fn test_failed_write_stream_removes_partial_file() {
        let temp = TempDir::new().unwrap();
        let (storage, observer) = observed(temp.path());
        let Some(target) = full_device_target(temp.path(), "stream.bin") else { return };

        let options = PlacementOptions::named("stream.bin");
        let mut stream = storage.write_stream(&options).await.unwrap();
        let _ = stream.write_all(&[1u8; 8192]).await;
        let err = stream.flush().await.expect_err("expected error");
        assert_eq!(err.kind(), std::io::ErrorKind::StorageFull);

        assert!(stream.is_failed());
        assert!(std::fs::symlink_metadata(&target).is_err());
        assert!(!observer.error.lock().unwrap().is_empty());

        let err = stream.finish().await.expect_err("expected error");
        assert!(matches!(err, StorageError::WriteFailed { .. }), "unexpected error: {err:?}");
    }
}

#[cfg(unix)]
mod permissions {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn set_mode(path: &Path, mode: u32) {
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).unwrap();
    }

    /// Returns `false` when permission bits are not enforced, e.g. when running as root.
    fn permissions_enforced(root: &Path) -> bool {
        let check = root.join(".permission-check");
        std::fs::write(&check, b"x").unwrap();
        set_mode(&check, 0o000);
        let enforced = std::fs::read(&check).is_err();
        set_mode(&check, 0o600);
        std::fs::remove_file(&check).unwrap();
        enforced
    }

    #[tokio::test]
    async fn test_unreadable_file_is_access_denied() {
        let temp = TempDir::new().unwrap();
        if !permissions_enforced(temp.path()) {
            return;
        }
        let storage = storage(temp.path());
        let locator =
            storage.write("secret", &PlacementOptions::named("locked.txt")).await.unwrap();
        set_mode(&temp.path().join("locked.txt"), 0o000);

        let err = storage.read(&locator, Encoding::Utf8).await.expect_err("expected error");
        assert!(matches!(err, StorageError::AccessDenied { .. }), "unexpected error: {err:?}");

        let err = storage.read_stream(&locator).await.expect_err("expected error");
        assert!(matches!(err, StorageError::AccessDenied { .. }), "unexpected error: {err:?}");

        set_mode(&temp.path().join("locked.txt"), 0o600);
    }

    #[tokio::test]
    async fn test_read_only_directory_is_access_denied() {
        let temp = TempDir::new().unwrap();
        if !permissions_enforced(temp.path()) {
            return;
        }
        let storage = storage(temp.path());
        let locator =
            storage.write("kept", &PlacementOptions::named("kept.txt").path("ro")).await.unwrap();
        let dir = temp.path().join("ro");
        set_mode(&dir, 0o555);

        let options = PlacementOptions::named("new.txt").path("ro");
        let err = storage.write("data", &options).await.expect_err("expected error");
        assert!(matches!(err, StorageError::AccessDenied { .. }), "unexpected error: {err:?}");

        let err = storage.write_stream(&options).await.expect_err("expected error");
        assert!(matches!(err, StorageError::AccessDenied { .. }), "unexpected error: {err:?}");

        let err = storage.delete(&locator).await.expect_err("expected error");
        assert!(matches!(err, StorageError::AccessDenied { .. }), "unexpected error: {err:?}");

        set_mode(&dir, 0o755);
        assert!(!dir.join("new.txt").exists());
        assert!(dir.join("kept.txt").is_file());
    }
}

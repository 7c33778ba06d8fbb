mod common;

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use common::TempFile;
use kenuts::cache::{ContentCache, FileSystem, LoadError};

struct MissingFs;

impl FileSystem for MissingFs {
    fn read_file(&self, _path: &Path) -> io::Result<Vec<u8>> {
        Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))
    }
}

#[test]
fn test_cache_starts_empty() {
    let cache = ContentCache::new();

    assert!(cache.snapshot().is_empty());
    assert_eq!(cache.version(), 0);
}

#[test]
fn test_cache_load_installs_file() {
    let file = TempFile::with_contents(b"<h1>hi</h1>");
    let cache = ContentCache::new();

    let version = cache.load(file.path()).unwrap();

    assert_eq!(version, 1);
    assert_eq!(cache.snapshot(), Bytes::from_static(b"<h1>hi</h1>"));
    assert_eq!(cache.current().body.len(), 11);
}

#[test]
fn test_cache_load_missing_file() {
    let cache = ContentCache::new();
    let err = cache.load(Path::new("/nonexistent/kenuts/index.html")).unwrap_err();

    assert!(matches!(err, LoadError::Io { .. }));
    assert!(cache.snapshot().is_empty());
}

#[test]
fn test_cache_injected_fs_error() {
    let cache = ContentCache::with_fs(Arc::new(MissingFs));
    let err = cache.load(Path::new("index.html")).unwrap_err();

    match err {
        LoadError::Io { source, .. } => assert_eq!(source.kind(), io::ErrorKind::PermissionDenied),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_cache_empty_file_keeps_previous_body() {
    let file = TempFile::with_contents(b"good");
    let cache = ContentCache::new();
    cache.load(file.path()).unwrap();

    file.write(b"");
    let err = cache.load(file.path()).unwrap_err();

    assert!(matches!(err, LoadError::EmptyContent { .. }));
    assert_eq!(cache.snapshot(), Bytes::from_static(b"good"));
    assert_eq!(cache.version(), 1);
}

#[test]
fn test_cache_reload_replaces_body() {
    let file = TempFile::with_contents(b"one");
    let cache = ContentCache::new();
    cache.load(file.path()).unwrap();

    file.write(b"two, longer");
    assert_eq!(cache.load(file.path()).unwrap(), 2);
    assert_eq!(cache.snapshot(), Bytes::from_static(b"two, longer"));
}

#[test]
fn test_cache_clones_share_storage() {
    let file = TempFile::with_contents(b"shared");
    let cache = ContentCache::new();
    let reader = cache.clone();

    cache.load(file.path()).unwrap();

    assert_eq!(reader.snapshot(), Bytes::from_static(b"shared"));
}

#[test]
fn test_snapshot_unaffected_by_later_reload() {
    let file = TempFile::with_contents(b"before");
    let cache = ContentCache::new();
    cache.load(file.path()).unwrap();

    let held = cache.snapshot();
    file.write(b"after");
    cache.load(file.path()).unwrap();

    assert_eq!(held, Bytes::from_static(b"before"));
}

/// Readers racing a writer whose file changes size on every reload must
/// always see a whole body: every byte encodes the length it was written with.
#[test]
fn test_concurrent_snapshots_never_torn() {
    let file = TempFile::with_contents(&body_of_len(1));
    let cache = ContentCache::new();
    cache.load(file.path()).unwrap();

    let done = AtomicBool::new(false);

    std::thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                let mut checked = 0u64;
                while !done.load(Ordering::Relaxed) || checked < 1_000 {
                    let body = cache.snapshot();
                    assert!(!body.is_empty());
                    let expected = (body.len() % 251) as u8;
                    assert!(
                        body.iter().all(|b| *b == expected),
                        "torn body of length {}",
                        body.len()
                    );
                    checked += 1;
                }
            });
        }

        for len in 2..400 {
            file.write(&body_of_len(len));
            cache.load(file.path()).unwrap();
        }
        done.store(true, Ordering::Relaxed);
    });
}

fn body_of_len(len: usize) -> Vec<u8> {
    vec![(len % 251) as u8; len]
}

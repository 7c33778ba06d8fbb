//! Shared helpers for integration tests.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use kenuts::cache::ContentCache;
use kenuts::config::Config;

static FILE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A file under the system temp dir, removed on drop.
pub struct TempFile {
    path: PathBuf,
}

impl TempFile {
    pub fn with_contents(contents: &[u8]) -> Self {
        let n = FILE_COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!("kenuts-test-{}-{}.html", std::process::id(), n));
        std::fs::write(&path, contents).unwrap();
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, contents: &[u8]) {
        std::fs::write(&self.path, contents).unwrap();
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Config bound to an ephemeral localhost port.
#[allow(dead_code)]
pub fn test_config(index_file: &Path) -> Config {
    Config {
        listen_addr: "127.0.0.1:0".to_string(),
        read_timeout_ms: 2_000,
        write_timeout_ms: 2_000,
        max_header_lines: 200,
        index_file: index_file.to_path_buf(),
        shutdown_timeout_ms: 0,
    }
}

/// A cache already holding `contents`, plus the file it was loaded from.
#[allow(dead_code)]
pub fn loaded_cache(contents: &[u8]) -> (ContentCache, TempFile) {
    let file = TempFile::with_contents(contents);
    let cache = ContentCache::new();
    cache.load(file.path()).unwrap();
    (cache, file)
}

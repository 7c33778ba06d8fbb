use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use bytes::Bytes;
use thiserror::Error;

use crate::cache::fs::{FileSystem, OsFileSystem};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is empty")]
    EmptyContent { path: PathBuf },
}

/// One installed version of the served file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CachedContent {
    pub body: Bytes,
    /// Number of successful loads up to and including this one; 0 means
    /// nothing has been loaded yet.
    pub version: u64,
}

/// In-memory copy of the served file.
///
/// Clones share the same storage. Readers take an atomic snapshot of the
/// current body; a reload reads the file first and only then swaps the
/// pointer, so the critical section never covers disk I/O and a reader can
/// never observe a half-installed body.
#[derive(Clone)]
pub struct ContentCache {
    current: Arc<ArcSwap<CachedContent>>,
    fs: Arc<dyn FileSystem>,
}

impl ContentCache {
    pub fn new() -> Self {
        Self::with_fs(Arc::new(OsFileSystem))
    }

    pub fn with_fs(fs: Arc<dyn FileSystem>) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(CachedContent::default())),
            fs,
        }
    }

    /// Reads `path` and installs its bytes as the new body.
    ///
    /// On failure the previously installed body stays in place.
    pub fn load(&self, path: &Path) -> Result<u64, LoadError> {
        let data = self.fs.read_file(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        if data.is_empty() {
            return Err(LoadError::EmptyContent {
                path: path.to_path_buf(),
            });
        }

        let body = Bytes::from(data);
        let previous = self.current.rcu(|old| CachedContent {
            body: body.clone(),
            version: old.version + 1,
        });

        // rcu hands back the value it replaced
        Ok(previous.version + 1)
    }

    /// Returns the body as of this call.
    pub fn snapshot(&self) -> Bytes {
        self.current.load().body.clone()
    }

    pub fn current(&self) -> Arc<CachedContent> {
        self.current.load_full()
    }

    pub fn version(&self) -> u64 {
        self.current.load().version
    }
}

impl Default for ContentCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ContentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let current = self.current.load();
        f.debug_struct("ContentCache")
            .field("len", &current.body.len())
            .field("version", &current.version)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Mutex;

    struct ScriptedFs {
        reads: Mutex<Vec<io::Result<Vec<u8>>>>,
    }

    impl FileSystem for ScriptedFs {
        fn read_file(&self, _path: &Path) -> io::Result<Vec<u8>> {
            self.reads.lock().unwrap().remove(0)
        }
    }

    #[test]
    fn failed_reloads_keep_last_good_body() {
        let fs = ScriptedFs {
            reads: Mutex::new(vec![
                Ok(b"first".to_vec()),
                Ok(Vec::new()),
                Err(io::Error::new(io::ErrorKind::NotFound, "gone")),
                Ok(b"second".to_vec()),
            ]),
        };
        let cache = ContentCache::with_fs(Arc::new(fs));
        let path = Path::new("index.html");

        assert_eq!(cache.load(path).unwrap(), 1);
        assert!(matches!(cache.load(path), Err(LoadError::EmptyContent { .. })));
        assert!(matches!(cache.load(path), Err(LoadError::Io { .. })));
        assert_eq!(cache.snapshot(), Bytes::from_static(b"first"));
        assert_eq!(cache.version(), 1);

        assert_eq!(cache.load(path).unwrap(), 2);
        assert_eq!(cache.snapshot(), Bytes::from_static(b"second"));
    }
}

//! File watcher driving cache reloads.

use std::path::{Path, PathBuf};

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::cache::store::ContentCache;

#[derive(Debug, Error)]
#[error("failed to watch {path}: {source}")]
pub struct WatchError {
    path: PathBuf,
    #[source]
    source: notify::Error,
}

/// Keeps the OS watch for one file alive.
///
/// Dropping it stops notifications and closes both channels of the
/// matching [`WatchEvents`].
pub struct FileWatch {
    path: PathBuf,
    _watcher: RecommendedWatcher,
}

/// Receiving side of a [`FileWatch`].
pub struct WatchEvents {
    /// Write notifications for the watched path.
    pub changes: mpsc::UnboundedReceiver<Event>,
    /// Errors reported by the watch backend.
    pub errors: mpsc::UnboundedReceiver<notify::Error>,
}

impl FileWatch {
    /// Starts watching `path` for writes.
    ///
    /// The watch sits on the parent directory and only events naming the
    /// file are forwarded, so replacing the file (write to a temp file,
    /// then rename over it) does not end the watch.
    pub fn start(path: &Path) -> Result<(Self, WatchEvents), WatchError> {
        let watch_error = |source| WatchError {
            path: path.to_path_buf(),
            source,
        };

        std::fs::metadata(path).map_err(|e| watch_error(notify::Error::io(e).add_path(path.to_path_buf())))?;
        let name = path
            .file_name()
            .ok_or_else(|| watch_error(notify::Error::generic("path has no file name")))?
            .to_os_string();
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };

        let (change_tx, changes) = mpsc::unbounded_channel();
        let (error_tx, errors) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let is_write = event.kind.is_modify() || event.kind.is_create();
                    let names_file = event.paths.iter().any(|p| p.file_name() == Some(name.as_os_str()));
                    if is_write && names_file {
                        let _ = change_tx.send(event);
                    }
                }
                Err(e) => {
                    let _ = error_tx.send(e);
                }
            },
            notify::Config::default(),
        )
        .map_err(watch_error)?;

        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(watch_error)?;

        tracing::info!(path = %path.display(), dir = %dir.display(), "File watcher started");

        Ok((
            Self {
                path: path.to_path_buf(),
                _watcher: watcher,
            },
            WatchEvents { changes, errors },
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Reloads `cache` from `path` on every change notification.
///
/// Failed reloads and watch errors are logged and otherwise ignored; the
/// task keeps running until the [`FileWatch`] is dropped.
pub fn spawn_reload_task(cache: ContentCache, path: PathBuf, events: WatchEvents) -> JoinHandle<()> {
    let WatchEvents {
        mut changes,
        mut errors,
    } = events;

    tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(event) = changes.recv() => {
                    tracing::info!(path = %path.display(), kind = ?event.kind, "File changed, reloading");
                    reload(&cache, &path).await;
                }
                Some(err) = errors.recv() => {
                    tracing::error!(path = %path.display(), error = %err, "Watcher error");
                }
                else => break,
            }
        }

        tracing::debug!(path = %path.display(), "Reload task finished");
    })
}

async fn reload(cache: &ContentCache, path: &Path) {
    let cache = cache.clone();
    let target = path.to_path_buf();

    match tokio::task::spawn_blocking(move || cache.load(&target)).await {
        Ok(Ok(version)) => {
            tracing::info!(path = %path.display(), version, "Content reloaded");
        }
        Ok(Err(e)) => {
            tracing::error!(path = %path.display(), error = %e, "Reload failed, keeping current content");
        }
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Reload task panicked");
        }
    }
}

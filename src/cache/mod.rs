//! Cached response body.
//!
//! The served file lives in memory inside a [`ContentCache`]. Connection
//! handlers only ever take snapshots; the file watcher is the only client
//! that reloads it.
//!
//! - **`store`**: the cache itself and its load/snapshot contract
//! - **`fs`**: file-read capability, swappable in tests
//! - **`watcher`**: `notify` adapter that reloads the cache on writes

pub mod fs;
pub mod store;
pub mod watcher;

pub use fs::{FileSystem, OsFileSystem};
pub use store::{CachedContent, ContentCache, LoadError};
pub use watcher::{FileWatch, WatchError, WatchEvents, spawn_reload_task};

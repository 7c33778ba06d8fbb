//! KENUTS - single-file ZG protocol server
//!
//! Serves one cached file over a line-based protocol and reloads it when the
//! file changes on disk.

pub mod cache;
pub mod client;
pub mod config;
pub mod http;
pub mod server;

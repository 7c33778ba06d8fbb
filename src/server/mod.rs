//! Listener ownership and the accept loop.

pub mod listener;

pub use listener::{ACCEPT_BACKOFF, Server, ServerError, is_transient};

use std::io;
use std::net::SocketAddr;
use std::ops::ControlFlow;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::cache::ContentCache;
use crate::config::Config;
use crate::http::connection::{Connection, ConnectionSettings};

/// Pause after a transient accept error before trying again.
pub const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("server already started")]
    AlreadyStarted,

    #[error("content not loaded; refusing to start")]
    ContentNotLoaded,
}

/// Owns the listener and the accept loop.
///
/// Each accepted connection is handled on its own task. [`Server::stop`]
/// signals the accept loop, which drops the listener when it exits.
/// Connections that are still being served are not waited for.
pub struct Server {
    config: Config,
    cache: ContentCache,
    closing: watch::Sender<bool>,
    accept_loop: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl Server {
    pub fn new(config: Config, cache: ContentCache) -> Self {
        let (closing, _) = watch::channel(false);
        Self {
            config,
            cache,
            closing,
            accept_loop: None,
            local_addr: None,
        }
    }

    /// Binds the listen address and spawns the accept loop.
    ///
    /// Returns as soon as the listener is bound. The loop ends when
    /// `shutdown` turns `true` (or its sender is dropped), when
    /// [`Server::stop`] is called, or on a non-transient accept error.
    ///
    /// The cache must have been loaded at least once; nothing is bound
    /// otherwise.
    pub async fn start(&mut self, shutdown: watch::Receiver<bool>) -> Result<SocketAddr, ServerError> {
        if self.local_addr.is_some() {
            return Err(ServerError::AlreadyStarted);
        }
        if self.cache.version() == 0 {
            return Err(ServerError::ContentNotLoaded);
        }

        let addr = self.config.listen_addr.clone();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        info!(address = %local_addr, "KENUTS server listening");

        let settings = ConnectionSettings::from(&self.config);
        let handle = tokio::spawn(accept_loop(
            listener,
            settings,
            self.cache.clone(),
            shutdown,
            self.closing.subscribe(),
        ));

        self.accept_loop = Some(handle);
        self.local_addr = Some(local_addr);
        Ok(local_addr)
    }

    /// Signals the accept loop to stop. Safe to call more than once, and
    /// before `start`.
    ///
    /// Returns immediately. The listener is dropped by the accept-loop task
    /// once it sees the signal; await [`Server::wait`] to know the socket
    /// has been released.
    pub fn stop(&self) {
        self.closing.send_replace(true);
    }

    /// Waits for the accept loop to finish. In-flight connections are not
    /// waited for.
    pub async fn wait(&mut self) {
        if let Some(handle) = self.accept_loop.take() {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Accept loop panicked");
            }
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

async fn accept_loop(
    listener: TcpListener,
    settings: ConnectionSettings,
    cache: ContentCache,
    mut shutdown: watch::Receiver<bool>,
    mut closing: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            info!("Shutting down accept loop");
            break;
        }
        if *closing.borrow() {
            info!("Server closing");
            break;
        }

        let accepted = tokio::select! {
            res = shutdown.changed() => {
                if res.is_err() {
                    info!("Shutdown handle dropped, shutting down accept loop");
                    break;
                }
                continue;
            }
            res = closing.changed() => {
                if res.is_err() {
                    break;
                }
                continue;
            }
            res = listener.accept() => res,
        };

        match accepted {
            Ok((socket, peer)) => {
                let cache = cache.clone();
                tokio::spawn(async move {
                    let conn = Connection::new(socket, peer, settings, cache);
                    let id = conn.id();
                    if let Err(e) = conn.run().await {
                        tracing::error!(conn = id, peer = %peer, error = %format!("{e:#}"), "Connection aborted");
                    }
                });
            }
            Err(e) => {
                if on_accept_error(&e).await.is_break() {
                    break;
                }
            }
        }
    }

    drop(listener);
    tracing::debug!("Listener closed");
}

/// Decides what the accept loop does after a failed accept.
///
/// Transient errors are logged and retried after [`ACCEPT_BACKOFF`];
/// anything else ends the loop.
async fn on_accept_error(err: &io::Error) -> ControlFlow<()> {
    if is_transient(err) {
        tracing::warn!(error = %err, "Temporary accept error");
        tokio::time::sleep(ACCEPT_BACKOFF).await;
        ControlFlow::Continue(())
    } else {
        tracing::error!(error = %err, "Accept error");
        ControlFlow::Break(())
    }
}

/// Whether an accept error is worth retrying.
pub fn is_transient(err: &io::Error) -> bool {
    use io::ErrorKind;

    if matches!(
        err.kind(),
        ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionRefused
            | ErrorKind::Interrupted
            | ErrorKind::WouldBlock
            | ErrorKind::TimedOut
    ) {
        return true;
    }

    out_of_descriptors(err)
}

// ENFILE, EMFILE: descriptors free up as connections close
#[cfg(unix)]
fn out_of_descriptors(err: &io::Error) -> bool {
    matches!(err.raw_os_error(), Some(23) | Some(24))
}

#[cfg(not(unix))]
fn out_of_descriptors(_err: &io::Error) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_accept_errors() {
        assert!(is_transient(&io::Error::from(io::ErrorKind::ConnectionAborted)));
        assert!(is_transient(&io::Error::from(io::ErrorKind::Interrupted)));
        assert!(!is_transient(&io::Error::from(io::ErrorKind::InvalidInput)));
        assert!(!is_transient(&io::Error::from(io::ErrorKind::NotConnected)));
    }

    #[cfg(unix)]
    #[test]
    fn descriptor_exhaustion_is_transient() {
        assert!(is_transient(&io::Error::from_raw_os_error(24)));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_accept_error_backs_off_and_continues() {
        let started = tokio::time::Instant::now();

        let flow = on_accept_error(&io::Error::from(io::ErrorKind::ConnectionAborted)).await;

        assert_eq!(flow, ControlFlow::Continue(()));
        assert!(started.elapsed() >= ACCEPT_BACKOFF);
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_accept_error_ends_loop_without_sleeping() {
        let started = tokio::time::Instant::now();

        let flow = on_accept_error(&io::Error::from(io::ErrorKind::InvalidInput)).await;

        assert_eq!(flow, ControlFlow::Break(()));
        assert!(started.elapsed() < ACCEPT_BACKOFF);
    }
}

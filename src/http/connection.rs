use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::{Instant, timeout_at};

use crate::cache::ContentCache;
use crate::config::Config;
use crate::http::parser::{ParseError, RequestLine, read_headers, read_request_line};
use crate::http::request::ParsedRequest;
use crate::http::response::{Response, StatusCode};
use crate::http::writer::ResponseWriter;

static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Reasons a connection is abandoned without (or partway through) a response.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("read deadline exceeded")]
    ReadDeadlineExceeded,

    #[error("write deadline exceeded")]
    WriteDeadlineExceeded,

    #[error("parse request: {0}")]
    Parse(#[from] ParseError),
}

/// Per-connection limits, taken from [`Config`].
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub max_header_lines: usize,
}

impl From<&Config> for ConnectionSettings {
    fn from(cfg: &Config) -> Self {
        Self {
            read_timeout: cfg.read_timeout(),
            write_timeout: cfg.write_timeout(),
            max_header_lines: cfg.max_header_lines,
        }
    }
}

/// Progress of a single connection. Every connection walks these in order
/// and ends in `Closed`, or in `Aborted` on the first failure.
#[derive(Debug)]
pub enum ConnectionState {
    Accepted,
    LineRead(RequestLine),
    HeadersRead(ParsedRequest),
    MethodChecked { request: ParsedRequest, allowed: bool },
    ResponseSent(StatusCode),
    Closed,
    Aborted,
}

pub struct Connection<S> {
    id: u64,
    stream: BufReader<S>,
    peer: String,
    settings: ConnectionSettings,
    cache: ContentCache,
    state: ConnectionState,
    shut_down: bool,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, peer: impl ToString, settings: ConnectionSettings, cache: ContentCache) -> Self {
        Self {
            id: CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            stream: BufReader::new(stream),
            peer: peer.to_string(),
            settings,
            cache,
            state: ConnectionState::Accepted,
            shut_down: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Handles one request and closes the connection.
    ///
    /// Returns the error that aborted the connection, if any. The stream is
    /// shut down on every path.
    pub async fn run(mut self) -> anyhow::Result<StatusCode> {
        tracing::info!(conn = self.id, peer = %self.peer, "Connection accepted");

        let result = self.drive().await;
        self.state = if result.is_ok() {
            ConnectionState::Closed
        } else {
            ConnectionState::Aborted
        };
        self.close().await;

        result
    }

    async fn drive(&mut self) -> anyhow::Result<StatusCode> {
        let read_deadline = Instant::now() + self.settings.read_timeout;

        loop {
            let state = std::mem::replace(&mut self.state, ConnectionState::Aborted);

            self.state = match state {
                ConnectionState::Accepted => {
                    let line = timeout_at(read_deadline, read_request_line(&mut self.stream))
                        .await
                        .map_err(|_| ConnectionError::ReadDeadlineExceeded)?
                        .map_err(ConnectionError::from)?;
                    ConnectionState::LineRead(line)
                }

                ConnectionState::LineRead(RequestLine { method, path }) => {
                    let max = self.settings.max_header_lines;
                    let headers = timeout_at(read_deadline, read_headers(&mut self.stream, max))
                        .await
                        .map_err(|_| ConnectionError::ReadDeadlineExceeded)?
                        .map_err(ConnectionError::from)?;
                    ConnectionState::HeadersRead(ParsedRequest {
                        method,
                        path,
                        headers,
                    })
                }

                ConnectionState::HeadersRead(request) => {
                    let allowed = request.method.serves_content();
                    ConnectionState::MethodChecked { request, allowed }
                }

                ConnectionState::MethodChecked { request, allowed } => {
                    let status = self.respond(&request, allowed).await?;
                    ConnectionState::ResponseSent(status)
                }

                ConnectionState::ResponseSent(status) => {
                    return Ok(status);
                }

                ConnectionState::Closed | ConnectionState::Aborted => {
                    anyhow::bail!("connection already finished");
                }
            };

            tracing::debug!(conn = self.id, state = ?self.state, "Connection advanced");
        }
    }

    async fn respond(&mut self, request: &ParsedRequest, allowed: bool) -> anyhow::Result<StatusCode> {
        let write_deadline = Instant::now() + self.settings.write_timeout;

        let response = if allowed {
            Response::ok(self.cache.snapshot())
        } else {
            tracing::warn!(
                conn = self.id,
                peer = %self.peer,
                method = %request.method,
                "Method not allowed"
            );
            Response::method_not_allowed()
        };

        let writer = ResponseWriter::new(&response);
        let written = timeout_at(write_deadline, writer.write_to(&mut self.stream))
            .await
            .map_err(|_| ConnectionError::WriteDeadlineExceeded)??;

        if allowed {
            tracing::info!(
                conn = self.id,
                peer = %self.peer,
                method = %request.method,
                path = %request.path,
                bytes = written,
                "Responded 200 OK"
            );
        }

        Ok(response.status)
    }

    /// Shuts the stream down. Safe to call more than once.
    async fn close(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        let _ = self.stream.get_mut().shutdown().await;
    }
}

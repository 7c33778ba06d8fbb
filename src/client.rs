//! Minimal `kenuts://` fetch client.
//!
//! Sends one request with the explicit `KENUTS` sentinel, reads until the
//! server closes the connection and hands back everything after the first
//! blank line.

use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::http::response::PROTOCOL_VERSION;

/// URL scheme understood by [`fetch`].
pub const SCHEME: &str = "kenuts";

/// Port used when the URL names none.
pub const DEFAULT_PORT: u16 = 6969;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("only kenuts:// URLs are supported, got {0:?}")]
    UnsupportedScheme(String),

    #[error("invalid URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid host in {0:?}")]
    InvalidHost(String),

    #[error("invalid port in {0:?}")]
    InvalidPort(String),

    #[error("response has no header/body separator")]
    MalformedResponse,
}

/// Where a `kenuts://host[:port]/path` URL points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KenutsUrl {
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl KenutsUrl {
    pub fn parse(raw: &str) -> Result<Self, ClientError> {
        if !raw.starts_with("kenuts://") {
            return Err(ClientError::UnsupportedScheme(raw.to_string()));
        }

        let url = url::Url::parse(raw).map_err(|source| match source {
            url::ParseError::InvalidPort => ClientError::InvalidPort(raw.to_string()),
            url::ParseError::EmptyHost => ClientError::InvalidHost(raw.to_string()),
            source => ClientError::InvalidUrl {
                url: raw.to_string(),
                source,
            },
        })?;

        let host = url
            .host_str()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ClientError::InvalidHost(raw.to_string()))?;

        let port = url.port().unwrap_or(DEFAULT_PORT);
        if port == 0 {
            return Err(ClientError::InvalidPort(raw.to_string()));
        }

        let path = match url.path() {
            "" => "/",
            p => p,
        };

        Ok(Self {
            host: host.to_string(),
            port,
            path: path.to_string(),
        })
    }

    /// Request bytes: sentinel request line, mode header, blank line.
    pub fn request(&self) -> Vec<u8> {
        format!("KENUTS GET {} {}\r\nZG-Mode: HTML\r\n\r\n", self.path, PROTOCOL_VERSION).into_bytes()
    }
}

/// Fetches `url` and returns the response body.
pub async fn fetch(url: &str) -> anyhow::Result<Bytes> {
    let target = KenutsUrl::parse(url)?;
    let addr = format!("{}:{}", target.host, target.port);

    let mut stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr))
        .await
        .context("Connection timeout")?
        .with_context(|| format!("Failed to connect to {addr}"))?;

    tracing::debug!(address = %addr, path = %target.path, "Sending KENUTS request");

    let raw = timeout(REQUEST_TIMEOUT, exchange(&mut stream, &target.request()))
        .await
        .context("Request timeout")??;

    Ok(split_body(raw)?)
}

async fn exchange(stream: &mut TcpStream, request: &[u8]) -> anyhow::Result<Vec<u8>> {
    stream.write_all(request).await.context("write request")?;
    stream.flush().await.context("flush request")?;

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.context("read response")?;
    Ok(raw)
}

/// Everything after the first `\r\n\r\n`.
pub fn split_body(raw: Vec<u8>) -> Result<Bytes, ClientError> {
    let end = raw
        .windows(4)
        .position(|window| window == b"\r\n\r\n")
        .ok_or(ClientError::MalformedResponse)?;

    Ok(Bytes::from(raw).slice(end + 4..))
}

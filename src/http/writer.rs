use anyhow::Context;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::http::response::Response;

/// Serializes the status line, headers and the blank separator line.
pub fn serialize_head(resp: &Response) -> Vec<u8> {
    let mut buf = Vec::with_capacity(128);

    buf.extend_from_slice(resp.status.status_line().as_bytes());
    buf.extend_from_slice(b"\r\n");

    for (k, v) in &resp.headers {
        buf.extend_from_slice(k.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(v.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }

    buf.extend_from_slice(b"\r\n");
    buf
}

/// Writes a response: head first, then the body.
///
/// Stops at the first failed write. Whatever was already written stays
/// written.
pub struct ResponseWriter<'a> {
    response: &'a Response,
}

impl<'a> ResponseWriter<'a> {
    pub fn new(response: &'a Response) -> Self {
        Self { response }
    }

    pub async fn write_to<W>(&self, stream: &mut W) -> anyhow::Result<usize>
    where
        W: AsyncWrite + Unpin,
    {
        let head = serialize_head(self.response);

        stream
            .write_all(&head)
            .await
            .context("write headers")?;
        stream
            .write_all(&self.response.body)
            .await
            .context("write body")?;
        stream.flush().await.context("flush response")?;

        Ok(head.len() + self.response.body.len())
    }
}

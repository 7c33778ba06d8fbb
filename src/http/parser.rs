use std::collections::HashMap;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::http::request::{Method, ParsedRequest};

/// Optional leading token naming the protocol explicitly.
pub const SENTINEL: &str = "KENUTS";

/// Longest accepted request or header line, line ending included.
pub const MAX_LINE_BYTES: usize = 8 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty request line")]
    EmptyRequestLine,

    #[error("stream ended before the request was complete")]
    Truncated,

    #[error("no blank line within {max} header lines")]
    TooManyHeaders { max: usize },

    #[error("line longer than {max} bytes")]
    LineTooLong { max: usize },
}

/// Method and path taken from the request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: Method,
    pub path: String,
}

/// Reads a request line and its headers from `reader`.
pub async fn parse_request<R>(reader: &mut R, max_header_lines: usize) -> Result<ParsedRequest, ParseError>
where
    R: AsyncBufRead + Unpin,
{
    let RequestLine { method, path } = read_request_line(reader).await?;
    let headers = read_headers(reader, max_header_lines).await?;

    Ok(ParsedRequest {
        method,
        path,
        headers,
    })
}

/// Reads and classifies the request line.
pub async fn read_request_line<R>(reader: &mut R) -> Result<RequestLine, ParseError>
where
    R: AsyncBufRead + Unpin,
{
    let line = read_line(reader).await?;
    parse_request_line(&line)
}

/// Splits a request line into method and path.
///
/// `[KENUTS] METHOD [PATH]`, path defaulting to `/`.
pub fn parse_request_line(line: &str) -> Result<RequestLine, ParseError> {
    let mut tokens = line.split_whitespace();
    let first = tokens.next().ok_or(ParseError::EmptyRequestLine)?;
    let second = tokens.next();
    let third = tokens.next();

    let (method, path) = match second {
        Some(method) if first.eq_ignore_ascii_case(SENTINEL) => (method, third),
        _ => (first, second),
    };

    Ok(RequestLine {
        method: Method::parse(method),
        path: path.unwrap_or("/").to_string(),
    })
}

/// Reads header lines until a blank line.
///
/// At most `max_lines` lines are read, counting lines without a colon that
/// get skipped. Running out of budget before the blank line is an error.
pub async fn read_headers<R>(reader: &mut R, max_lines: usize) -> Result<HashMap<String, String>, ParseError>
where
    R: AsyncBufRead + Unpin,
{
    let mut headers = HashMap::new();

    for _ in 0..max_lines {
        let line = read_line(reader).await?;
        let line = line.trim();

        if line.is_empty() {
            return Ok(headers);
        }

        match line.split_once(':') {
            Some((name, value)) if !name.trim().is_empty() => {
                headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
            }
            _ => {
                tracing::trace!(line, "Skipping malformed header line");
            }
        }
    }

    Err(ParseError::TooManyHeaders { max: max_lines })
}

/// Reads one `\n`-terminated line with the line ending removed.
///
/// Reads at most [`MAX_LINE_BYTES`]; a line that has not ended by then is
/// rejected without buffering the rest of it.
async fn read_line<R>(reader: &mut R) -> Result<String, ParseError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let n = (&mut *reader)
        .take(MAX_LINE_BYTES as u64)
        .read_until(b'\n', &mut buf)
        .await
        .map_err(|_| ParseError::Truncated)?;

    if buf.last() != Some(&b'\n') {
        if n == MAX_LINE_BYTES {
            return Err(ParseError::LineTooLong { max: MAX_LINE_BYTES });
        }
        // EOF, or EOF before the terminator
        return Err(ParseError::Truncated);
    }

    buf.pop();
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }

    Ok(String::from_utf8_lossy(&buf).into_owned())
}

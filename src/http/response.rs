use bytes::Bytes;

/// Protocol name and version sent on every status line.
pub const PROTOCOL_VERSION: &str = "ZG/1.0";

/// Status codes the server can answer with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 200 OK
    Ok,
    /// 405 Method Not Allowed
    MethodNotAllowed,
}

impl StatusCode {
    /// Returns the numeric status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use kenuts::http::response::StatusCode;
    /// assert_eq!(StatusCode::Ok.as_u16(), 200);
    /// assert_eq!(StatusCode::MethodNotAllowed.as_u16(), 405);
    /// ```
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::MethodNotAllowed => 405,
        }
    }

    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::MethodNotAllowed => "Method Not Allowed",
        }
    }

    /// Full status line without the trailing CRLF, e.g. `ZG/1.0 200 OK`.
    pub fn status_line(&self) -> String {
        format!("{} {} {}", PROTOCOL_VERSION, self.as_u16(), self.reason_phrase())
    }
}

/// A response ready to be written.
///
/// Headers are kept in insertion order; they go on the wire exactly as
/// listed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: StatusCode,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl Response {
    /// Success response carrying the cached content.
    pub fn ok(body: Bytes) -> Self {
        let headers = vec![
            ("ZG-Power".to_string(), "MAXIMUM".to_string()),
            ("Content-Length".to_string(), body.len().to_string()),
            (
                "Content-Type".to_string(),
                "text/html; charset=utf-8".to_string(),
            ),
        ];

        Self {
            status: StatusCode::Ok,
            headers,
            body,
        }
    }

    /// Fixed rejection for methods other than GET and HEAD.
    ///
    /// Carries no headers at all, not even `Content-Length`.
    pub fn method_not_allowed() -> Self {
        Self {
            status: StatusCode::MethodNotAllowed,
            headers: Vec::new(),
            body: Bytes::from_static(b"Method Not Allowed"),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

//! ZG protocol implementation.
//!
//! A connection carries exactly one request and one response; there is no
//! keep-alive and no request body.
//!
//! - **`connection`**: per-connection state machine, deadlines and method gating
//! - **`parser`**: request line and header parsing over a buffered reader
//! - **`request`**: parsed request and method types
//! - **`response`**: the two fixed responses the server can send
//! - **`writer`**: serializes and writes a response
//!
//! # Connection State Machine
//!
//! ```text
//!   Accepted ──► LineRead ──► HeadersRead ──► MethodChecked ──► ResponseSent ──► Closed
//!      │            │              │                 │
//!      └────────────┴──────────────┴─────────────────┴──► Aborted (I/O, parse or deadline failure)
//! ```
//!
//! A parse failure closes the connection without writing anything. A method
//! other than GET or HEAD gets the fixed 405 response.
//!
//! # Wire format
//!
//! ```text
//! [KENUTS ]METHOD PATH\r\n
//! Name: value\r\n
//! \r\n
//! ```

pub mod connection;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;

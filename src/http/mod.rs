//! HTTP/1.1 message codec.
//!
//! # Architecture
//!
//! - **`headers`**: case-insensitive header mapping with token-list values
//! - **`request`**: request representation and builder
//! - **`response`**: response representation and builder
//! - **`parser`**: parses requests and responses from byte buffers
//! - **`writer`**: serializes messages and writes them to non-blocking sockets
//! - **`content`**: text/* passthrough vs Base64 body transfer
//! - **`date`**: RFC 1123 timestamps
//! - **`mime`**: MIME type detection based on file extensions
//!
//! # Wire format
//!
//! ```text
//! GET /index.html HTTP/1.1\r\n        start line
//! Host:127.0.0.1:8089\r\n             name:value1,value2
//! If-Modified-Since:Sun, 06 Nov 1994 08:49:37 GMT\r\n
//! \r\n                                end of header block
//! <raw body bytes>                    no length framing
//! ```
//!
//! A body, when present, follows the blank line directly. Its end is the end
//! of the bytes available for the exchange; neither `Content-Length` nor
//! chunked encoding is used.

pub mod content;
pub mod date;
pub mod headers;
pub mod mime;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;

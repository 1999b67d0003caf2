use crate::http::headers::HeaderMap;
use crate::http::request::{Method, Request};
use crate::http::response::{Response, StatusCode};

/// A wire message that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// No blank line terminating the header block.
    #[error("header block is not terminated by an empty line")]
    Incomplete,
    #[error("malformed start line: {0:?}")]
    InvalidStartLine(String),
    #[error("unsupported method: {0:?}")]
    InvalidMethod(String),
    #[error("status code is not a number: {0:?}")]
    InvalidStatusCode(String),
    #[error("malformed header line: {0:?}")]
    InvalidHeader(String),
    #[error("header block is not valid UTF-8")]
    InvalidEncoding,
}

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Returns the offset of the first double CRLF, if any.
pub fn find_headers_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_TERMINATOR.len())
        .position(|w| w == HEADER_TERMINATOR)
}

/// Splits a message into its start line, header map and raw body.
fn split_message(buf: &[u8]) -> Result<(&str, HeaderMap, Vec<u8>), ParseError> {
    let headers_end = find_headers_end(buf).ok_or(ParseError::Incomplete)?;
    let header_bytes = &buf[..headers_end];
    let body = buf[headers_end + HEADER_TERMINATOR.len()..].to_vec();

    let head = std::str::from_utf8(header_bytes).map_err(|_| ParseError::InvalidEncoding)?;
    let mut lines = head.split("\r\n");
    let start_line = lines.next().unwrap_or_default();

    let mut headers = HeaderMap::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }

        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| ParseError::InvalidHeader(line.to_string()))?;
        headers.set(key, value);
    }

    Ok((start_line, headers, body))
}

/// Parses a request: `METHOD target HTTP/1.1`, headers, blank line, raw body.
///
/// The body is whatever follows the header block; there is no length framing.
pub fn parse_http_request(buf: &[u8]) -> Result<Request, ParseError> {
    let (start_line, headers, body) = split_message(buf)?;

    let parts: Vec<&str> = start_line.split_whitespace().collect();
    let [method_str, path, version] = parts[..] else {
        return Err(ParseError::InvalidStartLine(start_line.to_string()));
    };
    if !version.starts_with("HTTP/") {
        return Err(ParseError::InvalidStartLine(start_line.to_string()));
    }

    let method = Method::from_str(method_str)
        .ok_or_else(|| ParseError::InvalidMethod(method_str.to_string()))?;

    Ok(Request {
        method,
        path: path.to_string(),
        version: version.to_string(),
        headers,
        body,
    })
}

/// Parses a response: `HTTP/1.1 code reason`, headers, blank line, raw body.
pub fn parse_http_response(buf: &[u8]) -> Result<Response, ParseError> {
    let (start_line, headers, body) = split_message(buf)?;

    let parts: Vec<&str> = start_line.splitn(3, ' ').collect();
    let [version, code, reason] = parts[..] else {
        return Err(ParseError::InvalidStartLine(start_line.to_string()));
    };
    if !version.starts_with("HTTP/") {
        return Err(ParseError::InvalidStartLine(start_line.to_string()));
    }

    let code: u16 = code
        .parse()
        .map_err(|_| ParseError::InvalidStatusCode(code.to_string()))?;

    Ok(Response {
        status: StatusCode::from_u16(code),
        reason: reason.to_string(),
        headers,
        body,
    })
}

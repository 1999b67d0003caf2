use crate::http::headers::HeaderMap;

/// HTTP status codes spoken by the server.
///
/// - `Ok` (200): Resource returned or POST stored
/// - `MovedPermanently` (301): Permanent redirect, cached by the client
/// - `Found` (302): Temporary redirect
/// - `NotModified` (304): Conditional GET hit
/// - `NotFound` (404): Resource absent
/// - `MethodNotAllowed` (405): POST target is not a directory
/// - `InternalServerError` (500): Resolver or storage failure
///
/// Codes received from a peer that are not in this list are carried as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 200 OK
    Ok,
    /// 301 Moved Permanently
    MovedPermanently,
    /// 302 Found
    Found,
    /// 304 Not Modified
    NotModified,
    /// 404 Not Found
    NotFound,
    /// 405 Method Not Allowed
    MethodNotAllowed,
    /// 500 Internal Server Error
    InternalServerError,
    /// Any other numeric code
    Other(u16),
}

impl StatusCode {
    /// Returns the numeric HTTP status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use plainwire::http::response::StatusCode;
    /// assert_eq!(StatusCode::Ok.as_u16(), 200);
    /// assert_eq!(StatusCode::NotModified.as_u16(), 304);
    /// ```
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::MovedPermanently => 301,
            StatusCode::Found => 302,
            StatusCode::NotModified => 304,
            StatusCode::NotFound => 404,
            StatusCode::MethodNotAllowed => 405,
            StatusCode::InternalServerError => 500,
            StatusCode::Other(code) => *code,
        }
    }

    /// Maps a numeric code onto a variant.
    pub fn from_u16(code: u16) -> Self {
        match code {
            200 => StatusCode::Ok,
            301 => StatusCode::MovedPermanently,
            302 => StatusCode::Found,
            304 => StatusCode::NotModified,
            404 => StatusCode::NotFound,
            405 => StatusCode::MethodNotAllowed,
            500 => StatusCode::InternalServerError,
            other => StatusCode::Other(other),
        }
    }

    /// Returns the standard HTTP reason phrase for this status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use plainwire::http::response::StatusCode;
    /// assert_eq!(StatusCode::Ok.reason_phrase(), "OK");
    /// assert_eq!(StatusCode::MovedPermanently.reason_phrase(), "Moved Permanently");
    /// ```
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::MovedPermanently => "Moved Permanently",
            StatusCode::Found => "Found",
            StatusCode::NotModified => "Not Modified",
            StatusCode::NotFound => "Not Found",
            StatusCode::MethodNotAllowed => "Method Not Allowed",
            StatusCode::InternalServerError => "Internal Server Error",
            StatusCode::Other(_) => "Unknown",
        }
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self, StatusCode::MovedPermanently | StatusCode::Found)
    }
}

/// Represents a complete HTTP response.
///
/// The reason phrase is kept separately from the status so a parsed response
/// reproduces whatever phrase the peer sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// The HTTP status code
    pub status: StatusCode,
    /// The reason phrase on the status line
    pub reason: String,
    /// HTTP headers
    pub headers: HeaderMap,
    /// Response body as bytes, empty when absent
    pub body: Vec<u8>,
}

/// Builder for constructing HTTP responses in a fluent style.
///
/// # Example
///
/// ```ignore
/// let response = ResponseBuilder::new(StatusCode::Ok)
///     .header("Content-Type", "text/plain")
///     .body(b"hello".to_vec())
///     .build();
/// ```
pub struct ResponseBuilder {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl ResponseBuilder {
    /// Creates a new response builder with the specified status code.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    /// Adds or replaces a header. Blank values are ignored.
    pub fn header(mut self, key: &str, value: &str) -> Self {
        self.headers.set(key, value);
        self
    }

    /// Sets the response body.
    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Builds the final Response with the standard reason phrase.
    ///
    /// No Content-Length is added: the body is delimited by the end of the
    /// exchange, not by a length header.
    pub fn build(self) -> Response {
        Response {
            status: self.status,
            reason: self.status.reason_phrase().to_string(),
            headers: self.headers,
            body: self.body,
        }
    }
}

impl Response {
    /// Creates a response with the given status and no headers or body.
    pub fn new(status: StatusCode) -> Self {
        ResponseBuilder::new(status).build()
    }

    /// Creates a 404 Not Found response.
    pub fn not_found() -> Self {
        Self::new(StatusCode::NotFound)
    }

    /// Creates a 500 Internal Server Error response.
    pub fn internal_error() -> Self {
        Self::new(StatusCode::InternalServerError)
    }

    /// Sets a header on an already built response.
    pub fn set_header(&mut self, key: &str, value: &str) {
        self.headers.set(key, value);
    }

    pub fn header(&self, key: &str) -> Option<String> {
        self.headers.get(key)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.first("Content-Type")
    }
}

//! HTTP client.
//!
//! An exchange runs as a loop of hops. Each hop builds a request, borrows the
//! cached socket for the target's `host:port` (or opens a new one), sends the
//! request and reads until the peer goes quiet. A 301 or 302 turns into another
//! hop against the `Location`; 301s are remembered so later GETs of the same
//! URL go straight to the new target.

pub mod cache;
pub mod shell;
pub mod target;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::http::content::{self, DecodeError, DEFAULT_CONTENT_TYPE};
use crate::http::headers::HeaderMap;
use crate::http::parser::{self, ParseError};
use crate::http::request::{Method, Request};
use crate::http::response::{Response, StatusCode};
use crate::http::writer::{self, HTTP_VERSION};

use self::cache::{ConnectionCache, FreshnessCache, History, HistoryEntry, RedirectCache};
pub use self::target::Target;

const BUFFER_SIZE: usize = 8192;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("malformed response: {0}")]
    Malformed(#[from] ParseError),
    #[error("transport error: {0}")]
    Transport(#[source] io::Error),
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("connection closed before a response arrived")]
    ConnectionClosed,
    #[error("gave up after {0} redirects")]
    TooManyRedirects(usize),
    #[error("redirect without a Location header")]
    MissingLocation,
    #[error("invalid URL {0:?}: {1}")]
    InvalidUrl(String, String),
    #[error("failed to store response body: {0}")]
    Storage(#[source] io::Error),
    #[error("response body is not valid Base64: {0}")]
    Decode(#[from] DecodeError),
}

/// A body to send, as raw bytes; encoding for the wire happens on send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub content_type: String,
    pub data: Vec<u8>,
}

impl Payload {
    pub fn new(content_type: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            content_type: content_type.into(),
            data: data.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub method: Method,
    pub target: Target,
    pub payload: Option<Payload>,
}

impl Exchange {
    pub fn get(target: Target) -> Self {
        Self {
            method: Method::GET,
            target,
            payload: None,
        }
    }

    pub fn post(target: Target, payload: Payload) -> Self {
        Self {
            method: Method::POST,
            target,
            payload: Some(payload),
        }
    }
}

/// How an exchange ended, after any redirects were followed.
#[derive(Debug)]
pub enum ExchangeOutcome {
    /// A 200. `stored` is where a non-empty body was saved.
    Fetched {
        target: Target,
        response: Response,
        stored: Option<PathBuf>,
    },
    /// A 304: the copy fetched earlier is still current.
    NotModified { target: Target },
    /// Any other status, returned as received.
    Status { target: Target, response: Response },
}

impl ExchangeOutcome {
    pub fn target(&self) -> &Target {
        match self {
            ExchangeOutcome::Fetched { target, .. }
            | ExchangeOutcome::NotModified { target }
            | ExchangeOutcome::Status { target, .. } => target,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ExchangeOutcome::Fetched { response, .. } | ExchangeOutcome::Status { response, .. } => {
                response.status
            }
            ExchangeOutcome::NotModified { .. } => StatusCode::NotModified,
        }
    }
}

/// Client state shared by every clone: caches, history and settings.
#[derive(Clone)]
pub struct HttpClient {
    config: Arc<ClientConfig>,
    connections: Arc<ConnectionCache>,
    freshness: Arc<FreshnessCache>,
    redirects: Arc<RedirectCache>,
    history: Arc<History>,
}

impl HttpClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config: Arc::new(config),
            connections: Arc::new(ConnectionCache::new()),
            freshness: Arc::new(FreshnessCache::new()),
            redirects: Arc::new(RedirectCache::new()),
            history: Arc::new(History::new()),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn freshness(&self) -> &FreshnessCache {
        &self.freshness
    }

    pub fn redirects(&self) -> &RedirectCache {
        &self.redirects
    }

    pub fn connections(&self) -> &ConnectionCache {
        &self.connections
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.history.entries()
    }

    /// Target on the configured default host and port.
    pub fn default_target(&self, path: &str) -> Target {
        Target::new(self.config.default_host.clone(), self.config.default_port, path)
    }

    /// Runs one exchange to completion, following redirects.
    pub async fn exchange(&self, exchange: Exchange) -> Result<ExchangeOutcome, ClientError> {
        let Exchange {
            method,
            mut target,
            payload,
        } = exchange;

        for _ in 0..=self.config.max_redirects {
            if method == Method::GET {
                if let Some(cached) = self.redirects.lookup(&target) {
                    debug!(from = %target, to = %cached, "using cached redirect");
                    target = cached;
                }
            }

            let request = self.build_request(method, &target, payload.as_ref());
            let response = self.round_trip(&target, &request).await?;
            debug!(%method, %target, status = response.status.as_u16(), "exchange complete");

            match response.status {
                status if status.is_redirect() => {
                    let next = redirect_target(&target, &response)?;
                    if status == StatusCode::MovedPermanently {
                        self.redirects.remember(&target, &next);
                        debug!(from = %target, to = %next, "following permanent redirect");
                    } else {
                        debug!(from = %target, to = %next, "following temporary redirect");
                    }
                    target = next;
                }
                StatusCode::NotModified => {
                    info!(%target, "read from local cache");
                    return Ok(ExchangeOutcome::NotModified { target });
                }
                StatusCode::Ok => return self.complete(method, target, response).await,
                _ => return Ok(ExchangeOutcome::Status { target, response }),
            }
        }

        Err(ClientError::TooManyRedirects(self.config.max_redirects))
    }

    /// Builds the request message for one hop.
    ///
    /// GETs carry `If-Modified-Since` when a 200 for the same URL was seen;
    /// POST bodies are encoded according to their content type.
    pub fn build_request(&self, method: Method, target: &Target, payload: Option<&Payload>) -> Request {
        let mut headers = HeaderMap::new();
        headers.set("Host", &target.authority());
        headers.set("User-Agent", &user_agent());

        let mut body = Vec::new();
        match method {
            Method::GET => {
                if let Some(since) = self.freshness.get(target) {
                    headers.set("If-Modified-Since", &since);
                }
            }
            Method::POST => {
                if let Some(payload) = payload {
                    headers.set("Content-Type", &payload.content_type);
                    body = content::encode_body(&payload.content_type, &payload.data);
                }
            }
        }

        Request {
            method,
            path: target.path.clone(),
            version: HTTP_VERSION.to_string(),
            headers,
            body,
        }
    }

    /// Closes every cached connection; returns how many were open.
    pub fn close_all(&self) -> usize {
        let closed = self.connections.clear();
        if closed > 0 {
            info!(closed, "closed cached connections");
        }
        closed
    }

    /// Sends one request and reads its response.
    ///
    /// A cached socket the server has since closed surfaces only when the
    /// exchange on it fails. A GET is then retried once on a fresh socket; a
    /// POST is not, since the server may already have stored the upload.
    async fn round_trip(&self, target: &Target, request: &Request) -> Result<Response, ClientError> {
        let authority = target.authority();
        let wire = writer::serialize_request(request);
        let retryable = request.method == Method::GET;

        let (stream, reused) = self.connect(&authority).await?;
        match self.send_and_receive(stream, &authority, &wire).await {
            Err(ClientError::ConnectionClosed | ClientError::Transport(_)) if reused && retryable => {
                debug!(%authority, "cached connection went stale, reconnecting");
                let stream = self.open(&authority).await?;
                self.send_and_receive(stream, &authority, &wire).await
            }
            result => result,
        }
    }

    async fn send_and_receive(
        &self,
        mut stream: TcpStream,
        authority: &str,
        wire: &[u8],
    ) -> Result<Response, ClientError> {
        let io_timeout = self.config.io_timeout();
        timeout(io_timeout, stream.write_all(wire))
            .await
            .map_err(|_| ClientError::Timeout(io_timeout))?
            .map_err(ClientError::Transport)?;

        let (response, eof) = self.read_response(&stream).await?;
        if eof {
            debug!(authority, "server closed the connection");
        } else {
            self.connections.checkin(authority, stream);
        }
        Ok(response)
    }

    /// Takes the cached socket for `authority` if it is still open, else connects.
    async fn connect(&self, authority: &str) -> Result<(TcpStream, bool), ClientError> {
        if let Some(stream) = self.connections.checkout(authority) {
            if is_alive(&stream) {
                debug!(authority, "reusing cached connection");
                return Ok((stream, true));
            }
            debug!(authority, "cached connection closed by peer");
        }
        Ok((self.open(authority).await?, false))
    }

    async fn open(&self, authority: &str) -> Result<TcpStream, ClientError> {
        let io_timeout = self.config.io_timeout();
        let stream = timeout(io_timeout, TcpStream::connect(authority))
            .await
            .map_err(|_| ClientError::Timeout(io_timeout))?
            .map_err(ClientError::Transport)?;

        if let Err(e) = stream.set_nodelay(true) {
            warn!(authority, error = %e, "failed to set TCP_NODELAY");
        }
        debug!(authority, "opened connection");
        Ok(stream)
    }

    /// Reads until the header block is complete and the peer then stays quiet
    /// for the settle period, or closes. Returns whether the peer closed.
    async fn read_response(&self, stream: &TcpStream) -> Result<(Response, bool), ClientError> {
        let io_timeout = self.config.io_timeout();
        let settle = self.config.settle();
        let mut buffer = BytesMut::with_capacity(BUFFER_SIZE);
        let mut eof = false;

        loop {
            let complete = parser::find_headers_end(&buffer).is_some();
            let wait = if complete { settle } else { io_timeout };

            match timeout(wait, stream.readable()).await {
                Err(_) if complete => break,
                Err(_) => return Err(ClientError::Timeout(io_timeout)),
                Ok(Err(e)) => return Err(ClientError::Transport(e)),
                Ok(Ok(())) => {}
            }

            match stream.try_read_buf(&mut buffer) {
                Ok(0) => {
                    eof = true;
                    break;
                }
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => return Err(ClientError::Transport(e)),
            }
        }

        if buffer.is_empty() {
            return Err(ClientError::ConnectionClosed);
        }
        Ok((parser::parse_http_response(&buffer)?, eof))
    }

    /// Records a 200: saves a non-empty body and its Last-Modified.
    async fn complete(
        &self,
        method: Method,
        target: Target,
        response: Response,
    ) -> Result<ExchangeOutcome, ClientError> {
        let mut stored = None;
        if !response.body.is_empty() {
            let content_type = response.content_type().unwrap_or(DEFAULT_CONTENT_TYPE);
            let data = content::decode_body(content_type, &response.body)?;
            stored = Some(self.store(&target, &data).await?);

            if let Some(last_modified) = response.headers.first("Last-Modified") {
                self.freshness.record(&target, last_modified);
            }
        }

        self.history.push(method.as_str(), &target);
        Ok(ExchangeOutcome::Fetched {
            target,
            response,
            stored,
        })
    }

    async fn store(&self, target: &Target, data: &[u8]) -> Result<PathBuf, ClientError> {
        let dir = &self.config.receive_dir;
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(ClientError::Storage)?;

        let path = dir.join(target.file_name());
        tokio::fs::write(&path, data)
            .await
            .map_err(ClientError::Storage)?;
        info!(path = %path.display(), bytes = data.len(), "stored response body");
        Ok(path)
    }
}

fn user_agent() -> String {
    concat!("plainwire/", env!("CARGO_PKG_VERSION")).to_string()
}

fn redirect_target(from: &Target, response: &Response) -> Result<Target, ClientError> {
    let location = response
        .headers
        .first("Location")
        .ok_or(ClientError::MissingLocation)?;
    from.resolve_location(location)
}

/// Checks a cached socket without blocking: end-of-stream or unread bytes
/// (left over from an earlier exchange) both mean it cannot be reused.
fn is_alive(stream: &TcpStream) -> bool {
    let mut byte = [0u8; 1];
    match stream.try_read(&mut byte) {
        Err(e) => e.kind() == io::ErrorKind::WouldBlock,
        Ok(_) => false,
    }
}

//! Protocol engine: turns one received request into one response.
//!
//! ```text
//!  parse ──► resolve ──► absent ─────────────────────────► 404
//!                  │
//!                  ├─ POST ─► not a directory ───────────► 405
//!                  │        └ decode body ─► write ──────► 200 + Content-Location
//!                  │                          └ failure ─► 500
//!                  │
//!                  └─ GET ──► root directory ────────────► 301 Location: <index>
//!                           ├ other directory ───────────► 404
//!                           ├ If-Modified-Since >= mtime ► 304
//!                           └ otherwise ─────────────────► 200 + body
//! ```
//!
//! Every response is stamped with `Date` and `Server`.

use std::sync::Arc;
use std::time::SystemTime;

use tracing::{debug, warn};

use crate::http::content::{self, DEFAULT_CONTENT_TYPE};
use crate::http::date::{format_http_date, not_modified_since, parse_http_date};
use crate::http::parser::{ParseError, parse_http_request};
use crate::http::request::{Method, Request};
use crate::http::response::{Response, ResponseBuilder, StatusCode};
use crate::server::resolver::{Resolution, ResolveError, ResourceResolver};

pub struct ProtocolEngine {
    resolver: Arc<dyn ResourceResolver>,
    server_name: String,
    /// `host:port` used in redirects when the request carries no Host header.
    authority: String,
    index_file: String,
}

impl ProtocolEngine {
    pub fn new(
        resolver: Arc<dyn ResourceResolver>,
        server_name: impl Into<String>,
        authority: impl Into<String>,
        index_file: impl Into<String>,
    ) -> Self {
        Self {
            resolver,
            server_name: server_name.into(),
            authority: authority.into(),
            index_file: index_file.into(),
        }
    }

    /// Parses raw request bytes and computes the response.
    ///
    /// A malformed request is returned as an error; the caller drops the
    /// connection instead of answering.
    pub fn handle(&self, raw: &[u8]) -> Result<Response, ParseError> {
        let request = parse_http_request(raw)?;
        Ok(self.respond(&request))
    }

    /// Computes the response for a parsed request.
    pub fn respond(&self, request: &Request) -> Response {
        let mut response = self.dispatch(request);

        response.set_header("Date", &format_http_date(SystemTime::now()));
        response.set_header("Server", &self.server_name);

        debug!(
            method = %request.method,
            path = %request.path,
            status = response.status.as_u16(),
            "exchange complete"
        );
        response
    }

    fn dispatch(&self, request: &Request) -> Response {
        let resolution = match self
            .resolver
            .resolve(request.method, &request.path, &request.headers)
        {
            Ok(resolution) => resolution,
            Err(ResolveError::NotFound(_)) => return Response::not_found(),
            Err(e) => {
                warn!(path = %request.path, error = %e, "resolver failed");
                return Response::internal_error();
            }
        };

        if !resolution.exists {
            return Response::not_found();
        }

        match request.method {
            Method::POST => self.store(request, &resolution),
            Method::GET => self.serve(request, resolution),
        }
    }

    fn store(&self, request: &Request, resolution: &Resolution) -> Response {
        if !resolution.is_directory {
            return Response::new(StatusCode::MethodNotAllowed);
        }

        let content_type = request.content_type().unwrap_or(DEFAULT_CONTENT_TYPE);
        let body = match content::decode_body(content_type, &request.body) {
            Ok(body) => body,
            Err(e) => {
                warn!(path = %request.path, content_type, error = %e, "upload body does not decode");
                return Response::internal_error();
            }
        };

        match self.resolver.write(&request.path, content_type, &body) {
            Ok(location) => ResponseBuilder::new(StatusCode::Ok)
                .header("Content-Location", &location)
                .build(),
            Err(ResolveError::NotFound(_)) => Response::not_found(),
            Err(ResolveError::WriteConflict(_)) => Response::new(StatusCode::MethodNotAllowed),
            Err(e) => {
                warn!(path = %request.path, error = %e, "failed to store upload");
                Response::internal_error()
            }
        }
    }

    fn serve(&self, request: &Request, resolution: Resolution) -> Response {
        if resolution.is_directory {
            if !resolution.is_root {
                return Response::not_found();
            }
            let authority = request.headers.first("Host").unwrap_or(&self.authority);
            let location = format!("http://{}/{}", authority, self.index_file);
            return ResponseBuilder::new(StatusCode::MovedPermanently)
                .header("Location", &location)
                .build();
        }

        let last_modified = format_http_date(resolution.last_modified);

        let since = request
            .headers
            .first("If-Modified-Since")
            .and_then(parse_http_date);
        if let Some(since) = since {
            if not_modified_since(since, resolution.last_modified) {
                return ResponseBuilder::new(StatusCode::NotModified)
                    .header("Last-Modified", &last_modified)
                    .header("ETag", &last_modified)
                    .build();
            }
        }

        let body = content::encode_body(&resolution.content_type, &resolution.body);
        ResponseBuilder::new(StatusCode::Ok)
            .header("Content-Type", &resolution.content_type)
            .header("Last-Modified", &last_modified)
            .header("ETag", &last_modified)
            .body(body)
            .build()
    }
}

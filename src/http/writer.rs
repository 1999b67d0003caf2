use std::io::{self, Write};

use crate::http::headers::HeaderMap;
use crate::http::request::Request;
use crate::http::response::Response;

pub const HTTP_VERSION: &str = "HTTP/1.1";

fn write_head(buf: &mut Vec<u8>, headers: &HeaderMap) {
    for (name, values) in headers.iter() {
        buf.extend_from_slice(name.as_bytes());
        buf.push(b':');
        buf.extend_from_slice(values.join(",").as_bytes());
        buf.extend_from_slice(b"\r\n");
    }

    // Header/body separator
    buf.extend_from_slice(b"\r\n");
}

pub fn serialize_request(req: &Request) -> Vec<u8> {
    let mut buf = Vec::with_capacity(128 + req.body.len());

    let request_line = format!("{} {} {}\r\n", req.method, req.path, req.version);
    buf.extend_from_slice(request_line.as_bytes());
    write_head(&mut buf, &req.headers);
    buf.extend_from_slice(&req.body);

    buf
}

pub fn serialize_response(resp: &Response) -> Vec<u8> {
    let mut buf = Vec::with_capacity(128 + resp.body.len());

    let status_line = format!(
        "{} {} {}\r\n",
        HTTP_VERSION,
        resp.status.as_u16(),
        resp.reason
    );
    buf.extend_from_slice(status_line.as_bytes());
    write_head(&mut buf, &resp.headers);
    buf.extend_from_slice(&resp.body);

    buf
}

/// A serialized message being written to a non-blocking socket.
///
/// Tracks how much has been written so a write interrupted by `WouldBlock`
/// resumes where it stopped on the next writable event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingBuffer {
    buffer: Vec<u8>,
    written: usize,
}

impl OutgoingBuffer {
    pub fn new(buffer: Vec<u8>) -> Self {
        Self { buffer, written: 0 }
    }

    pub fn from_response(response: &Response) -> Self {
        Self::new(serialize_response(response))
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.written
    }

    pub fn is_done(&self) -> bool {
        self.written >= self.buffer.len()
    }

    /// Writes as much as the sink accepts.
    ///
    /// Returns `Ok(true)` once the whole buffer is out and `Ok(false)` if the
    /// sink would block with bytes still pending.
    pub fn write_to<W: Write>(&mut self, sink: &mut W) -> io::Result<bool> {
        while self.written < self.buffer.len() {
            match sink.write(&self.buffer[self.written..]) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "connection closed while writing",
                    ));
                }
                Ok(n) => self.written += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        sink.flush()?;
        Ok(true)
    }
}

use std::fmt;
use std::io::{self, Read};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use mio::net::TcpStream;
use mio::{Interest, Registry, Token};
use tracing::{debug, info, warn};

use crate::http::parser::ParseError;
use crate::http::writer::OutgoingBuffer;
use crate::server::reaper::{ActivityTracker, ConnectionControl};

const READ_CHUNK: usize = 4096;

/// Where a connection is in its current exchange.
#[derive(Debug)]
pub enum ConnectionState {
    /// Waiting for the next request.
    Idle,
    /// Part of a request has arrived.
    Reading,
    /// A request is being turned into a response; never evicted.
    Handling,
    /// A response is pending on the socket.
    Writing(OutgoingBuffer),
}

impl ConnectionState {
    pub fn interest(&self) -> Interest {
        match self {
            ConnectionState::Writing(_) => Interest::WRITABLE,
            _ => Interest::READABLE,
        }
    }

    pub fn is_handling(&self) -> bool {
        matches!(self, ConnectionState::Handling)
    }
}

/// Why a connection is being closed.
#[derive(Debug)]
pub enum CloseReason {
    PeerClosed,
    IdleTimeout,
    Transport(io::Error),
    Malformed(ParseError),
    HeaderTooLarge,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::PeerClosed => f.write_str("peer closed the connection"),
            CloseReason::IdleTimeout => f.write_str("idle past keep-alive timeout"),
            CloseReason::Transport(e) => write!(f, "transport error: {e}"),
            CloseReason::Malformed(e) => write!(f, "malformed request: {e}"),
            CloseReason::HeaderTooLarge => f.write_str("header block too large"),
        }
    }
}

/// Bytes pulled off a socket by one drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Drained {
    pub bytes: usize,
    pub eof: bool,
}

pub struct Connection {
    pub stream: TcpStream,
    pub peer: SocketAddr,
    pub state: ConnectionState,
    /// Request bytes received but not yet handled.
    pub inbound: Vec<u8>,
}

impl Connection {
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            stream,
            peer,
            state: ConnectionState::Idle,
            inbound: Vec::with_capacity(READ_CHUNK),
        }
    }

    /// Reads everything currently available into `inbound`.
    pub fn drain_readable(&mut self) -> io::Result<Drained> {
        let mut chunk = [0u8; READ_CHUNK];
        let mut bytes = 0;

        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return Ok(Drained { bytes, eof: true }),
                Ok(n) => {
                    self.inbound.extend_from_slice(&chunk[..n]);
                    bytes += n;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(Drained { bytes, eof: false });
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

/// Every accepted connection, keyed by its readiness token.
///
/// The read/write loop owns the sockets through this table; the accept loop
/// inserts into it and the reaper may only close entries.
pub struct ConnectionTable {
    connections: DashMap<Token, Connection>,
    registry: Registry,
    activity: Arc<ActivityTracker>,
    next_token: AtomicUsize,
}

impl ConnectionTable {
    /// `registry` must belong to the poll instance of the read/write loop.
    pub fn new(registry: Registry, activity: Arc<ActivityTracker>) -> Self {
        Self {
            connections: DashMap::new(),
            registry,
            activity,
            next_token: AtomicUsize::new(1),
        }
    }

    /// Adds a freshly accepted socket, interested in reads.
    pub fn admit(&self, stream: TcpStream, peer: SocketAddr) -> io::Result<Token> {
        let token = Token(self.next_token.fetch_add(1, Ordering::Relaxed));

        // Insert before registering so the first readiness event finds the entry.
        self.connections.insert(token, Connection::new(stream, peer));
        let registered = match self.connections.get_mut(&token) {
            Some(mut conn) => self
                .registry
                .register(&mut conn.stream, token, Interest::READABLE),
            None => Ok(()),
        };
        if let Err(e) = registered {
            self.connections.remove(&token);
            return Err(e);
        }

        self.activity.touch(peer, token);
        Ok(token)
    }

    /// Runs `f` against the connection behind `token`, if it is still open.
    ///
    /// The entry stays locked while `f` runs, so `f` must not call back into
    /// the table's map (`admit`, `close`, probing).
    pub fn with_connection<R>(&self, token: Token, f: impl FnOnce(&mut Connection) -> R) -> Option<R> {
        self.connections.get_mut(&token).map(|mut conn| f(&mut conn))
    }

    /// Re-registers the connection's socket for `interest`.
    pub fn set_interest(&self, conn: &mut Connection, token: Token, interest: Interest) -> io::Result<()> {
        self.registry.reregister(&mut conn.stream, token, interest)
    }

    /// Cancels the registration and closes the socket.
    ///
    /// Returns `false` if the connection was already closed, so every
    /// accepted connection is closed exactly once.
    pub fn close(&self, token: Token, reason: CloseReason) -> bool {
        match self.connections.remove(&token) {
            Some((_, conn)) => {
                self.release(token, conn, reason);
                true
            }
            None => false,
        }
    }

    fn release(&self, token: Token, mut conn: Connection, reason: CloseReason) {
        if let Err(e) = self.registry.deregister(&mut conn.stream) {
            debug!(peer = %conn.peer, error = %e, "deregister failed");
        }
        self.activity.forget(conn.peer, token);

        match &reason {
            CloseReason::IdleTimeout => info!(peer = %conn.peer, "closing idle connection"),
            CloseReason::PeerClosed => debug!(peer = %conn.peer, "connection closed by peer"),
            other => warn!(peer = %conn.peer, reason = %other, "closing connection"),
        }
        // Dropping the stream closes the socket.
        drop(conn);
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

impl ConnectionControl for ConnectionTable {
    fn is_handling(&self, token: Token) -> bool {
        self.connections
            .get(&token)
            .is_some_and(|conn| conn.state.is_handling())
    }

    /// The state check and the removal happen under one entry lock, so a
    /// connection that starts handling a request is never closed mid-exchange.
    fn evict(&self, token: Token) -> bool {
        match self
            .connections
            .remove_if(&token, |_, conn| !conn.state.is_handling())
        {
            Some((_, conn)) => {
                self.release(token, conn, CloseReason::IdleTimeout);
                true
            }
            None => false,
        }
    }
}

//! The read/write loop.
//!
//! ```text
//!        ┌─────────────┐
//!        │    Idle     │ ← interest: readable
//!        └──────┬──────┘
//!               │ bytes arrive
//!               ▼
//!        ┌─────────────┐
//!        │   Reading   │ ← until the header block is complete
//!        └──────┬──────┘
//!               │ request complete
//!               ▼
//!        ┌─────────────┐
//!        │  Handling   │ ← protocol engine runs, reaper keeps hands off
//!        └──────┬──────┘
//!               │ response ready, interest: writable
//!               ▼
//!        ┌─────────────┐
//!        │   Writing   │ ← until the whole response is out
//!        └──────┬──────┘
//!               │ interest: readable
//!               └─► Idle
//! ```
//!
//! Any read or write failure closes the connection on the spot.

use std::io;
use std::mem;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use mio::{Events, Interest, Poll, Token};
use tracing::{error, info, trace};

use crate::http::parser::find_headers_end;
use crate::http::writer::OutgoingBuffer;
use crate::server::connection::{CloseReason, ConnectionState, ConnectionTable};
use crate::server::engine::ProtocolEngine;
use crate::server::reaper::ActivityTracker;

enum ReadOutcome {
    /// Waiting for more of the request, or busy with the previous exchange.
    Pending,
    Request(Vec<u8>),
    Close(CloseReason),
}

pub struct Multiplexer {
    poll: Poll,
    table: Arc<ConnectionTable>,
    engine: Arc<ProtocolEngine>,
    activity: Arc<ActivityTracker>,
    poll_interval: Duration,
    max_header_bytes: usize,
}

impl Multiplexer {
    /// `poll` must be the instance whose registry `table` was built with.
    pub fn new(
        poll: Poll,
        table: Arc<ConnectionTable>,
        engine: Arc<ProtocolEngine>,
        activity: Arc<ActivityTracker>,
        poll_interval: Duration,
        max_header_bytes: usize,
    ) -> Self {
        Self {
            poll,
            table,
            engine,
            activity,
            poll_interval,
            max_header_bytes,
        }
    }

    pub fn run(mut self, active: &AtomicBool) {
        let mut events = Events::with_capacity(1024);

        while active.load(Ordering::Acquire) {
            if let Err(e) = self.poll.poll(&mut events, Some(self.poll_interval)) {
                if e.kind() != io::ErrorKind::Interrupted {
                    error!(error = %e, "read/write poll failed");
                }
                continue;
            }

            for event in events.iter() {
                let token = event.token();
                if event.is_readable() || event.is_read_closed() || event.is_error() {
                    self.on_readable(token);
                }
                if event.is_writable() {
                    self.on_writable(token);
                }
            }
        }

        info!(open = self.table.len(), "read/write loop stopped");
    }

    fn on_readable(&self, token: Token) {
        let max_header_bytes = self.max_header_bytes;
        let read = self.table.with_connection(token, |conn| {
            if matches!(conn.state, ConnectionState::Handling | ConnectionState::Writing(_)) {
                // One exchange at a time; the bytes stay queued in the socket.
                return (conn.peer, 0, ReadOutcome::Pending);
            }

            let drained = match conn.drain_readable() {
                Ok(drained) => drained,
                Err(e) => return (conn.peer, 0, ReadOutcome::Close(CloseReason::Transport(e))),
            };

            let outcome = if find_headers_end(&conn.inbound).is_some() {
                conn.state = ConnectionState::Handling;
                ReadOutcome::Request(mem::take(&mut conn.inbound))
            } else if drained.eof {
                ReadOutcome::Close(CloseReason::PeerClosed)
            } else if conn.inbound.len() > max_header_bytes {
                ReadOutcome::Close(CloseReason::HeaderTooLarge)
            } else {
                if !conn.inbound.is_empty() {
                    conn.state = ConnectionState::Reading;
                }
                ReadOutcome::Pending
            };
            (conn.peer, drained.bytes, outcome)
        });

        let Some((peer, bytes, outcome)) = read else {
            return;
        };
        if bytes > 0 {
            self.activity.touch(peer, token);
        }

        match outcome {
            ReadOutcome::Pending => {}
            ReadOutcome::Close(reason) => {
                self.table.close(token, reason);
            }
            ReadOutcome::Request(raw) => self.handle(token, peer, &raw),
        }
    }

    /// Runs the protocol engine with no table lock held, then queues the response.
    fn handle(&self, token: Token, peer: SocketAddr, raw: &[u8]) {
        let response = match self.engine.handle(raw) {
            Ok(response) => response,
            Err(e) => {
                self.table.close(token, CloseReason::Malformed(e));
                return;
            }
        };
        trace!(%peer, status = response.status.as_u16(), "response ready");

        let outgoing = OutgoingBuffer::from_response(&response);
        let queued = self.table.with_connection(token, |conn| {
            conn.state = ConnectionState::Writing(outgoing);
            let interest = conn.state.interest();
            self.table.set_interest(conn, token, interest)
        });

        if let Some(Err(e)) = queued {
            self.table.close(token, CloseReason::Transport(e));
        }
    }

    fn on_writable(&self, token: Token) {
        let written = self.table.with_connection(token, |conn| -> io::Result<Option<SocketAddr>> {
            let ConnectionState::Writing(outgoing) = &mut conn.state else {
                return Ok(None);
            };
            if !outgoing.write_to(&mut conn.stream)? {
                return Ok(None);
            }

            conn.state = ConnectionState::Idle;
            self.table.set_interest(conn, token, Interest::READABLE)?;
            Ok(Some(conn.peer))
        });

        match written {
            Some(Ok(Some(peer))) => {
                trace!(%peer, "response written");
                self.activity.touch(peer, token);
            }
            Some(Err(e)) => {
                self.table.close(token, CloseReason::Transport(e));
            }
            _ => {}
        }
    }
}

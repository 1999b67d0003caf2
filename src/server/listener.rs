use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token};
use tracing::{error, info, warn};

use crate::server::connection::ConnectionTable;

const LISTENER: Token = Token(0);

/// The accept loop: hands every new socket to the read/write loop's table.
pub struct Acceptor {
    poll: Poll,
    listener: TcpListener,
    table: Arc<ConnectionTable>,
    poll_interval: Duration,
}

impl Acceptor {
    pub fn new(
        mut listener: TcpListener,
        table: Arc<ConnectionTable>,
        poll_interval: Duration,
    ) -> io::Result<Self> {
        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;

        Ok(Self {
            poll,
            listener,
            table,
            poll_interval,
        })
    }

    pub fn run(mut self, active: &AtomicBool) {
        let mut events = Events::with_capacity(128);

        while active.load(Ordering::Acquire) {
            if let Err(e) = self.poll.poll(&mut events, Some(self.poll_interval)) {
                if e.kind() != io::ErrorKind::Interrupted {
                    error!(error = %e, "accept poll failed");
                }
                continue;
            }

            for event in events.iter() {
                if event.token() == LISTENER {
                    self.accept_pending();
                }
            }
        }

        info!("accept loop stopped");
    }

    /// Accepts until the listener would block.
    fn accept_pending(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        warn!(%peer, error = %e, "failed to set TCP_NODELAY");
                    }
                    match self.table.admit(stream, peer) {
                        Ok(token) => info!(%peer, token = token.0, "accepted connection"),
                        Err(e) => warn!(%peer, error = %e, "failed to register connection"),
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    break;
                }
            }
        }
    }
}

//! HTTP server.
//!
//! Three independent loops share the process:
//!
//! - **accept loop** (`listener`): polls the listening socket and registers
//!   every accepted connection with the read/write loop.
//! - **read/write loop** (`multiplexer`): drains readable sockets into the
//!   protocol engine and writes responses once sockets are writable.
//! - **reaper** (`reaper`): closes connections idle past the keep-alive timeout.
//!
//! Both readiness loops wait at most one poll interval at a time and all three
//! stop once the handle clears the shared `active` flag. Open connections are
//! abandoned on shutdown, not drained.

pub mod connection;
pub mod engine;
pub mod listener;
pub mod multiplexer;
pub mod reaper;
pub mod resolver;

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use anyhow::Context;
use mio::Poll;
use mio::net::TcpListener;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::server::connection::ConnectionTable;
use crate::server::engine::ProtocolEngine;
use crate::server::listener::Acceptor;
use crate::server::multiplexer::Multiplexer;
use crate::server::reaper::{ActivityTracker, ConnectionControl, Reaper};
use crate::server::resolver::ResourceResolver;

/// A bound, not yet running server.
pub struct Server {
    config: ServerConfig,
    listener: TcpListener,
    resolver: Arc<dyn ResourceResolver>,
}

impl Server {
    pub fn bind(config: ServerConfig, resolver: Arc<dyn ResourceResolver>) -> anyhow::Result<Self> {
        let addr = config
            .listen_addr
            .to_socket_addrs()
            .with_context(|| format!("invalid listen address {}", config.listen_addr))?
            .next()
            .with_context(|| format!("listen address {} resolves to nothing", config.listen_addr))?;

        let listener = TcpListener::bind(addr).with_context(|| format!("failed to bind {addr}"))?;
        info!("HTTP service listening on {}", listener.local_addr()?);

        Ok(Self {
            config,
            listener,
            resolver,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Spawns the accept, read/write and reaper loops.
    pub fn start(self) -> anyhow::Result<ServerHandle> {
        let local_addr = self.listener.local_addr()?;
        let active = Arc::new(AtomicBool::new(true));

        let poll = Poll::new().context("failed to create readiness poll")?;
        let activity = Arc::new(ActivityTracker::new());
        let table = Arc::new(ConnectionTable::new(
            poll.registry().try_clone()?,
            activity.clone(),
        ));
        let engine = Arc::new(ProtocolEngine::new(
            self.resolver,
            self.config.server_name.clone(),
            local_addr.to_string(),
            self.config.index_file.clone(),
        ));

        let poll_interval = self.config.poll_interval();
        let acceptor = Acceptor::new(self.listener, table.clone(), poll_interval)?;
        let multiplexer = Multiplexer::new(
            poll,
            table.clone(),
            engine,
            activity.clone(),
            poll_interval,
            self.config.max_header_bytes,
        );
        let control: Arc<dyn ConnectionControl> = table.clone();
        let reaper = Reaper::new(activity, control, self.config.keep_alive_timeout());

        let mut handle = ServerHandle {
            active: active.clone(),
            workers: Vec::with_capacity(3),
            local_addr,
            table,
        };

        let flag = active.clone();
        handle.workers.push(
            thread::Builder::new()
                .name("plainwire-accept".into())
                .spawn(move || acceptor.run(&flag))?,
        );
        let flag = active.clone();
        handle.workers.push(
            thread::Builder::new()
                .name("plainwire-io".into())
                .spawn(move || multiplexer.run(&flag))?,
        );
        let flag = active;
        handle.workers.push(
            thread::Builder::new()
                .name("plainwire-reaper".into())
                .spawn(move || reaper.run(&flag, poll_interval))?,
        );

        info!(%local_addr, "HTTP service started");
        Ok(handle)
    }
}

/// Controls a running server; dropping it stops the loops.
pub struct ServerHandle {
    active: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
    local_addr: SocketAddr,
    table: Arc<ConnectionTable>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of connections currently open.
    pub fn open_connections(&self) -> usize {
        self.table.len()
    }

    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Clears the active flag and waits for every loop to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if self.workers.is_empty() {
            return;
        }

        self.active.store(false, Ordering::Release);
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("server loop panicked");
            }
        }
        info!(local_addr = %self.local_addr, "HTTP service stopped");
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

//! Client-side caches.
//!
//! Every cache is a `DashMap`, so parallel exchanges serialize their
//! replace/insert operations per key without a global lock. None of them is
//! ever evicted except the connection cache, whose dead sockets are replaced.

use std::time::SystemTime;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tracing::debug;

use crate::client::target::Target;

/// Last-Modified values of resources fetched with a 200, keyed by `host:port/path`.
#[derive(Debug, Default)]
pub struct FreshnessCache {
    entries: DashMap<String, String>,
}

impl FreshnessCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, target: &Target) -> Option<String> {
        self.entries.get(&target.cache_key()).map(|v| v.clone())
    }

    pub fn record(&self, target: &Target, last_modified: &str) {
        self.entries.insert(target.cache_key(), last_modified.to_string());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Permanent redirects observed so far, keyed by the original `host:port/path`.
#[derive(Debug, Default)]
pub struct RedirectCache {
    entries: DashMap<String, Target>,
}

impl RedirectCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, target: &Target) -> Option<Target> {
        self.entries.get(&target.cache_key()).map(|t| t.clone())
    }

    pub fn remember(&self, from: &Target, to: &Target) {
        self.entries.insert(from.cache_key(), to.clone());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One reusable socket per `host:port`.
///
/// A socket is checked out for the length of an exchange and checked back in
/// afterwards, so no map guard is ever held across network I/O.
#[derive(Debug, Default)]
pub struct ConnectionCache {
    sockets: DashMap<String, TcpStream>,
}

impl ConnectionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn checkout(&self, authority: &str) -> Option<TcpStream> {
        self.sockets.remove(authority).map(|(_, stream)| stream)
    }

    /// Stores `stream` for reuse, replacing whatever was cached for `authority`.
    pub fn checkin(&self, authority: &str, stream: TcpStream) {
        if self.sockets.insert(authority.to_string(), stream).is_some() {
            debug!(authority, "replaced cached connection");
        }
    }

    /// Drops every cached socket, closing it.
    pub fn clear(&self) -> usize {
        let count = self.sockets.len();
        self.sockets.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.sockets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sockets.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub at: SystemTime,
    /// `METHOD host:port/path`
    pub line: String,
}

/// Completed exchanges, oldest first.
#[derive(Debug, Default)]
pub struct History {
    entries: Mutex<Vec<HistoryEntry>>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, method: &str, target: &Target) {
        self.entries.lock().push(HistoryEntry {
            at: SystemTime::now(),
            line: format!("{method} {}", target.cache_key()),
        });
    }

    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

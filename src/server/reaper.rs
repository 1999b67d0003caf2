//! Keep-alive reaper.
//!
//! Connections are tracked by remote address with the time they were last
//! active. Each scan refreshes connections that are busy handling a request,
//! closes the ones idle past the timeout, and decides whether the next scan
//! can wait: when nothing was active very recently the reaper sleeps for a
//! tenth of the timeout, otherwise it rescans after one poll interval.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use mio::Token;
use tracing::{debug, info};

/// Last activity of one remote peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Activity {
    pub token: Token,
    pub last_seen: Instant,
}

/// Idle timestamps keyed by remote address.
#[derive(Debug, Default)]
pub struct ActivityTracker {
    entries: DashMap<SocketAddr, Activity>,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn touch(&self, peer: SocketAddr, token: Token) {
        self.touch_at(peer, token, Instant::now());
    }

    /// Records activity; a known address is updated in place, so a peer that
    /// reconnects keeps a single timeline.
    pub fn touch_at(&self, peer: SocketAddr, token: Token, now: Instant) {
        self.entries
            .entry(peer)
            .and_modify(|activity| {
                activity.token = token;
                activity.last_seen = now;
            })
            .or_insert(Activity {
                token,
                last_seen: now,
            });
    }

    /// Stops tracking `peer` if it still maps to `token`.
    pub fn forget(&self, peer: SocketAddr, token: Token) {
        self.entries
            .remove_if(&peer, |_, activity| activity.token == token);
    }

    pub fn get(&self, peer: &SocketAddr) -> Option<Activity> {
        self.entries.get(peer).map(|activity| *activity)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The reaper's view of the connection table.
pub trait ConnectionControl: Send + Sync {
    /// Whether the connection is computing a response right now.
    fn is_handling(&self, token: Token) -> bool;

    /// Closes the connection unless it is handling a request, checking and
    /// closing as one step. Returns `false` if nothing was closed.
    fn evict(&self, token: Token) -> bool;
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub evicted: Vec<SocketAddr>,
    /// No tracked connection was active within the lazy window.
    pub lazy: bool,
}

pub struct Reaper {
    tracker: Arc<ActivityTracker>,
    connections: Arc<dyn ConnectionControl>,
    timeout: Duration,
}

impl Reaper {
    pub fn new(tracker: Arc<ActivityTracker>, connections: Arc<dyn ConnectionControl>, timeout: Duration) -> Self {
        Self {
            tracker,
            connections,
            timeout,
        }
    }

    /// Pause between scans when nothing is close to changing.
    pub fn lazy_interval(&self) -> Duration {
        self.timeout / 10
    }

    fn busy_window(&self) -> Duration {
        self.lazy_interval().mul_f64(0.67)
    }

    /// One pass over every tracked connection as of `now`.
    pub fn scan(&self, now: Instant) -> ScanReport {
        let busy_window = self.busy_window();
        let mut lazy = true;
        let mut expired = Vec::new();

        for mut entry in self.tracker.entries.iter_mut() {
            let peer = *entry.key();
            let activity = entry.value_mut();

            if self.connections.is_handling(activity.token) {
                activity.last_seen = now;
                continue;
            }

            let idle = now.saturating_duration_since(activity.last_seen);
            if idle > self.timeout {
                expired.push((peer, activity.token));
            } else if idle < busy_window {
                lazy = false;
            }
        }

        let mut evicted = Vec::with_capacity(expired.len());
        for (peer, token) in expired {
            // Re-check under the entry lock: activity may have landed since the pass.
            let removed = self.tracker.entries.remove_if(&peer, |_, activity| {
                activity.token == token
                    && now.saturating_duration_since(activity.last_seen) > self.timeout
            });
            if removed.is_none() {
                continue;
            }
            if self.connections.evict(token) {
                evicted.push(peer);
            } else if self.connections.is_handling(token) {
                // Busy since the pass; keep tracking it.
                self.tracker.touch_at(peer, token, now);
            }
        }

        ScanReport { evicted, lazy }
    }

    /// Scans until `active` is cleared.
    pub fn run(&self, active: &AtomicBool, pause: Duration) {
        info!(timeout_ms = self.timeout.as_millis() as u64, "keep-alive reaper started");

        while active.load(Ordering::Acquire) {
            let report = self.scan(Instant::now());
            if !report.evicted.is_empty() {
                debug!(count = report.evicted.len(), "evicted idle connections");
            }

            let rest = if report.lazy {
                self.lazy_interval()
            } else {
                pause
            };
            nap(active, rest, pause);
        }

        info!("keep-alive reaper stopped");
    }
}

/// Sleeps for `total`, waking every `step` to notice shutdown.
fn nap(active: &AtomicBool, total: Duration, step: Duration) {
    let deadline = Instant::now() + total;
    while active.load(Ordering::Acquire) {
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            break;
        }
        thread::sleep(left.min(step.max(Duration::from_millis(1))));
    }
}

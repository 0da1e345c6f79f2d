use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

#[derive(Default)]
pub struct FeederStats {
    pub lines: AtomicU64,
}

/// TCP feeders currently connected. Written by connection threads, read by the UI.
pub struct SharedState {
    // concurrent map so readers never block the UI loop
    pub feeders: DashMap<SocketAddr, FeederStats>,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            feeders: DashMap::new(),
        }
    }

    pub fn insert(&self, addr: SocketAddr) {
        self.feeders.insert(addr, FeederStats::default());
    }

    pub fn record_line(&self, addr: &SocketAddr) {
        if let Some(stats) = self.feeders.get(addr) {
            stats.lines.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn remove(&self, addr: &SocketAddr) {
        self.feeders.remove(addr);
    }

    pub fn dispose(&self) {
        self.feeders.clear();
    }

    /// `(address, lines received)` sorted by address.
    pub fn summary(&self) -> Vec<(SocketAddr, u64)> {
        let mut out: Vec<(SocketAddr, u64)> = self
            .feeders
            .iter()
            .map(|e| (*e.key(), e.value().lines.load(Ordering::Relaxed)))
            .collect();
        out.sort_by_key(|(addr, _)| *addr);
        out
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

//! Process-wide atomic counters.
//!
//! Updated exclusively from the reactor thread but kept atomic since the
//! management channel's `STATS` handler reads them from the same thread and
//! a future multi-thread reactor would need no further changes here.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Metrics {
    connects: AtomicU64,
    disconnects: AtomicU64,
    current: AtomicU64,
    max_concurrent: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Sent,
    Received,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub current_connections: u64,
    pub max_concurrent: u64,
    pub total_connections: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_connect(&self) {
        self.connects.fetch_add(1, Ordering::Relaxed);
        let current = self.current.fetch_add(1, Ordering::Relaxed) + 1;
        self.max_concurrent.fetch_max(current, Ordering::Relaxed);
    }

    pub fn on_disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::Relaxed);
        self.current.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn on_bytes(&self, direction: Direction, n: u64) {
        match direction {
            Direction::Sent => self.bytes_sent.fetch_add(n, Ordering::Relaxed),
            Direction::Received => self.bytes_received.fetch_add(n, Ordering::Relaxed),
        };
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            current_connections: self.current.load(Ordering::Relaxed),
            max_concurrent: self.max_concurrent.load(Ordering::Relaxed),
            total_connections: self.connects.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_current_and_max_concurrent() {
        let m = Metrics::new();
        m.on_connect();
        m.on_connect();
        m.on_connect();
        m.on_disconnect();
        let snap = m.snapshot();
        assert_eq!(snap.current_connections, 2);
        assert_eq!(snap.max_concurrent, 3);
        assert_eq!(snap.total_connections, 3);
    }

    #[test]
    fn bytes_tracked_per_direction() {
        let m = Metrics::new();
        m.on_bytes(Direction::Sent, 100);
        m.on_bytes(Direction::Received, 40);
        m.on_bytes(Direction::Sent, 5);
        let snap = m.snapshot();
        assert_eq!(snap.bytes_sent, 105);
        assert_eq!(snap.bytes_received, 40);
    }
}

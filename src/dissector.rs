//! Best-effort credential-disclosure heuristic scan over relayed bytes.
//!
//! Gated by a runtime toggle (mutated from the management channel) and by
//! whether the connection's username is known. Never mutates relayed bytes
//! and never blocks; a match is logged through the log sink.

use crate::logsink::LogSink;
use crate::metrics::Direction;
use std::sync::atomic::{AtomicBool, Ordering};

const PATTERNS: &[&str] = &["user=", "pass=", "password=", "authorization: basic"];

pub struct Dissector {
    enabled: AtomicBool,
}

impl Dissector {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, value: bool) {
        self.enabled.store(value, Ordering::Relaxed);
    }

    /// Scans `bytes` for recognizable credential patterns and logs any
    /// match. Case-insensitive; a single pass over a lowercased copy.
    pub fn inspect(&self, log: &mut LogSink, username: &str, direction: Direction, bytes: &[u8]) {
        if !self.enabled() {
            return;
        }
        let text = String::from_utf8_lossy(bytes).to_lowercase();
        for pattern in PATTERNS {
            if text.contains(pattern) {
                let dir = match direction {
                    Direction::Sent => "sent",
                    Direction::Received => "received",
                };
                log.emit(&format!(
                    "dissector: possible credential disclosure for user '{username}' ({dir}): matched '{pattern}'"
                ));
            }
        }
    }
}

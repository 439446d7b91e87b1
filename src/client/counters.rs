//! Session byte counters
//!
//! Two monotonically increasing accumulators, incremented by the pumps and
//! read by any observer. Never reset during a session.

use std::sync::atomic::{AtomicU64, Ordering};

/// Cumulative transport traffic for one session
#[derive(Debug, Default)]
pub struct Counters {
    received: AtomicU64,
    sent: AtomicU64,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_received(&self, n: u64) {
        self.received.fetch_add(n, Ordering::SeqCst);
    }

    pub fn add_sent(&self, n: u64) {
        self.sent.fetch_add(n, Ordering::SeqCst);
    }

    pub fn received(&self) -> u64 {
        self.received.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::SeqCst)
    }
}

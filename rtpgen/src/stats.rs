//! Emission counters.
//!
//! Updated by the emission loop with relaxed atomics and read by anyone
//! holding the generator. Counters survive `stop()`/`start()` cycles.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters shared between the generator handle and its worker.
#[derive(Debug, Default)]
pub struct GeneratorStats {
    // ---
    packets_sent: AtomicU64,
    bytes_sent: AtomicU64,
    packets_suppressed: AtomicU64,
    catchup_packets: AtomicU64,
    payloads_forwarded: AtomicU64,
    loop_iterations: AtomicU64,
}

/// Point-in-time copy of [`GeneratorStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    // ---
    /// Packets handed to the sink
    pub packets_sent: u64,

    /// Serialized bytes handed to the sink
    pub bytes_sent: u64,

    /// Packets synthesized but withheld while suspended
    pub packets_suppressed: u64,

    /// Packets beyond the first in a single loop iteration
    pub catchup_packets: u64,

    /// Transmitted packets that carried a queued payload
    pub payloads_forwarded: u64,

    /// Loop iterations (one per ticker wakeup, plus the first)
    pub loop_iterations: u64,
}

impl GeneratorStats {
    // ---
    pub fn new() -> Self {
        // ---
        Self::default()
    }

    pub(crate) fn record_sent(&self, bytes: usize, forwarded_payload: bool) {
        // ---
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
        if forwarded_payload {
            self.payloads_forwarded.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_suppressed(&self) {
        // ---
        self.packets_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_iteration(&self, due: u64) {
        // ---
        self.loop_iterations.fetch_add(1, Ordering::Relaxed);
        if due > 1 {
            self.catchup_packets.fetch_add(due - 1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        // ---
        StatsSnapshot {
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            packets_suppressed: self.packets_suppressed.load(Ordering::Relaxed),
            catchup_packets: self.catchup_packets.load(Ordering::Relaxed),
            payloads_forwarded: self.payloads_forwarded.load(Ordering::Relaxed),
            loop_iterations: self.loop_iterations.load(Ordering::Relaxed),
        }
    }
}

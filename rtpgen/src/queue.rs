//! Outbound application payload queue.
//!
//! Producers enqueue opaque payload chunks at their own pace; the emission
//! loop takes at most one per transmitted packet. The queue has its own
//! mutex, separate from the lifecycle lock, so enqueue latency never
//! depends on a state transition in progress.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Unbounded FIFO of payload chunks. Clones share the same queue.
#[derive(Debug, Clone, Default)]
pub struct PayloadQueue {
    // ---
    inner: Arc<Mutex<VecDeque<Vec<u8>>>>,
}

impl PayloadQueue {
    // ---
    pub fn new() -> Self {
        // ---
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Vec<u8>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends `payload` at the tail.
    pub fn enqueue(&self, payload: impl Into<Vec<u8>>) {
        // ---
        self.lock().push_back(payload.into());
    }

    /// Removes and returns the oldest payload, or `None` when empty.
    pub fn dequeue(&self) -> Option<Vec<u8>> {
        // ---
        self.lock().pop_front()
    }

    /// Number of payloads waiting.
    pub fn len(&self) -> usize {
        // ---
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        // ---
        self.lock().is_empty()
    }
}

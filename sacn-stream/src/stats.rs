//! Receive counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared between the receive loop and observers.
///
/// `packets_per_second` reports the last completed one-second window; the
/// receive loop rolls the window on its own ticker.
#[derive(Debug, Default)]
pub struct ReceiverStats {
    accepted: AtomicU64,
    ignored: AtomicU64,
    decode_errors: AtomicU64,
    current_window: AtomicU64,
    last_window: AtomicU64,
}

impl ReceiverStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Data packets decoded and handed to the handler
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    /// Datagrams that were not sACN data packets
    pub fn ignored(&self) -> u64 {
        self.ignored.load(Ordering::Relaxed)
    }

    /// Data packets that failed structural decoding
    pub fn decode_errors(&self) -> u64 {
        self.decode_errors.load(Ordering::Relaxed)
    }

    /// Accepted packets in the last completed one-second window
    pub fn packets_per_second(&self) -> u64 {
        self.last_window.load(Ordering::Relaxed)
    }

    pub(crate) fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
        self.current_window.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_ignored(&self) {
        self.ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Close the current window and return its count
    pub(crate) fn roll_window(&self) -> u64 {
        let count = self.current_window.swap(0, Ordering::Relaxed);
        self.last_window.store(count, Ordering::Relaxed);
        count
    }
}

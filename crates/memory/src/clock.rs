//! Monotonic turn timestamps.

use std::sync::atomic::{AtomicI64, Ordering};

/// Issues wall-clock seconds that never go backwards within the process.
///
/// A clock step backwards (NTP, manual change) repeats the last issued
/// value instead; `seq` then keeps the order.
#[derive(Debug, Default)]
pub struct TurnClock {
    last: AtomicI64,
}

impl TurnClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a floor, e.g. the largest timestamp already on disk.
    pub fn starting_at(floor: i64) -> Self {
        Self {
            last: AtomicI64::new(floor),
        }
    }

    pub fn next(&self) -> i64 {
        self.next_from(chrono::Utc::now().timestamp())
    }

    fn next_from(&self, now: i64) -> i64 {
        let prev = self.last.fetch_max(now, Ordering::SeqCst);
        prev.max(now)
    }
}

//! The node's adjusted clock.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

/// Wall-clock time plus a signed offset.
///
/// The network layer nudges the offset toward the median of its peers'
/// clocks; tests use it to travel in time. Cheap to clone, all clones share
/// the offset.
#[derive(Clone, Debug, Default)]
pub struct AdjustedClock {
    offset: Arc<AtomicI64>,
}

impl AdjustedClock {
    pub fn new() -> AdjustedClock {
        AdjustedClock::default()
    }

    /// The current adjusted time.
    pub fn now(&self) -> DateTime<Utc> {
        Utc::now() + Duration::seconds(self.offset.load(Ordering::Relaxed))
    }

    /// Replace the offset, in seconds.
    pub fn set_offset(&self, seconds: i64) {
        self.offset.store(seconds, Ordering::Relaxed);
    }

    /// Shift the offset forward (or, negative, backward) by `seconds`.
    pub fn advance(&self, seconds: i64) {
        self.offset.fetch_add(seconds, Ordering::Relaxed);
    }
}

//! Wall-clock abstraction.

use chrono::{FixedOffset, Local, Offset, Utc};

/// Source of "now" and the local UTC offset.
pub trait Clock: Send + Sync {
    /// Current time, epoch milliseconds.
    fn now_ms(&self) -> i64;
    /// Current local offset used for wall-clock math.
    fn local_offset(&self) -> FixedOffset;
}

/// Clock backed by the system time and local timezone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }

    fn local_offset(&self) -> FixedOffset {
        Local::now().offset().fix()
    }
}

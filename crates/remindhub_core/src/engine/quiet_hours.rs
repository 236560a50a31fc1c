//! Quiet-hours classification and forward deferral.
//!
//! # Invariants
//! - A deferred time is always `>=` the requested time and lies outside the
//!   window.
//! - Candidates are aligned to the local step boundary (quarter-hour by
//!   default) and never exceed the horizon.

use crate::model::settings::QuietHours;
use chrono::{DateTime, FixedOffset, Timelike};

const MS_PER_MINUTE: i64 = 60_000;

/// Where an instant sits relative to quiet hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuietHoursState {
    Outside,
    InsideAllowed,
    InsideBlocked,
}

/// Result of applying the policy to one fire time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuietHoursDecision {
    Unchanged(i64),
    Deferred(i64),
    Blocked,
}

impl QuietHoursDecision {
    /// Fire time to dispatch at, if any.
    pub fn fire_at_ms(self) -> Option<i64> {
        match self {
            Self::Unchanged(at) | Self::Deferred(at) => Some(at),
            Self::Blocked => None,
        }
    }
}

/// Step and horizon used when searching for the next allowed instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuietHoursPolicy {
    pub step_minutes: u32,
    pub horizon_minutes: u32,
}

impl Default for QuietHoursPolicy {
    fn default() -> Self {
        Self {
            step_minutes: 15,
            horizon_minutes: 7 * 24 * 60,
        }
    }
}

impl QuietHoursPolicy {
    pub fn new(step_minutes: u32, horizon_minutes: u32) -> Self {
        Self {
            step_minutes: step_minutes.max(1),
            horizon_minutes,
        }
    }

    pub fn classify(
        &self,
        window: &QuietHours,
        at_ms: i64,
        offset: FixedOffset,
        allowed: bool,
    ) -> QuietHoursState {
        match minute_of_day(at_ms, offset) {
            Some(minute) if window.contains_minute(minute) => {
                if allowed {
                    QuietHoursState::InsideAllowed
                } else {
                    QuietHoursState::InsideBlocked
                }
            }
            _ => QuietHoursState::Outside,
        }
    }

    pub fn apply(
        &self,
        window: &QuietHours,
        at_ms: i64,
        offset: FixedOffset,
        allowed: bool,
    ) -> QuietHoursDecision {
        match self.classify(window, at_ms, offset, allowed) {
            QuietHoursState::Outside | QuietHoursState::InsideAllowed => {
                QuietHoursDecision::Unchanged(at_ms)
            }
            QuietHoursState::InsideBlocked => self.defer(window, at_ms, offset),
        }
    }

    fn defer(&self, window: &QuietHours, at_ms: i64, offset: FixedOffset) -> QuietHoursDecision {
        let step_ms = i64::from(self.step_minutes) * MS_PER_MINUTE;
        let horizon_end = at_ms.saturating_add(i64::from(self.horizon_minutes) * MS_PER_MINUTE);
        let offset_ms = i64::from(offset.local_minus_utc()) * 1_000;

        // Align on local wall-clock boundaries, not UTC ones.
        let local = at_ms + offset_ms;
        let mut candidate = local.div_euclid(step_ms) * step_ms - offset_ms;
        if candidate < at_ms {
            candidate += step_ms;
        }

        while candidate <= horizon_end {
            match minute_of_day(candidate, offset) {
                Some(minute) if !window.contains_minute(minute) => {
                    return QuietHoursDecision::Deferred(candidate);
                }
                Some(_) => candidate += step_ms,
                None => break,
            }
        }
        QuietHoursDecision::Blocked
    }
}

/// Local minute of day for an epoch-millisecond instant.
pub fn minute_of_day(at_ms: i64, offset: FixedOffset) -> Option<u32> {
    let local = DateTime::from_timestamp_millis(at_ms)?.with_timezone(&offset);
    Some(local.hour() * 60 + local.minute())
}

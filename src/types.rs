//! # Core Identifier and Query Types
//!
//! Plain value types shared by every layer of the storage core: timestamps,
//! series identifiers, page offsets, and the single-series range query.
//!
//! Timestamps are signed 64-bit microsecond counters. The valid range is
//! `[0, i64::MAX]`; the zero point is the Unix epoch. All ordering in the
//! engine — page index sort order, generation keys, merge order — derives
//! from `(TimeStamp, ParamId)` tuple comparison.

use std::fmt;
use std::ops::{Add, Sub};

/// Identifier of a logical series. Opaque to the storage core.
pub type ParamId = u32;

/// Byte offset of an entry inside a page, measured from the page start.
pub type EntryOffset = u32;

/// Microseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TimeStamp(pub i64);

impl TimeStamp {
    /// Smallest representable timestamp.
    pub const MIN: TimeStamp = TimeStamp(0);
    /// Largest representable timestamp.
    pub const MAX: TimeStamp = TimeStamp(i64::MAX);

    /// Current wall-clock time in microseconds since the epoch.
    pub fn utc_now() -> TimeStamp {
        TimeStamp(chrono::Utc::now().timestamp_micros())
    }

    pub fn micros(self) -> i64 {
        self.0
    }

    /// Saturating subtraction of a duration, clamped to the valid range.
    pub fn saturating_sub(self, d: TimeDuration) -> TimeStamp {
        TimeStamp(self.0.saturating_sub(d.0).max(0))
    }
}

impl fmt::Display for TimeStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}us", self.0)
    }
}

impl Sub for TimeStamp {
    type Output = TimeDuration;

    fn sub(self, rhs: TimeStamp) -> TimeDuration {
        TimeDuration(self.0 - rhs.0)
    }
}

impl Add<TimeDuration> for TimeStamp {
    type Output = TimeStamp;

    fn add(self, rhs: TimeDuration) -> TimeStamp {
        TimeStamp(self.0 + rhs.0)
    }
}

/// Signed distance between two timestamps, in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TimeDuration(pub i64);

impl TimeDuration {
    pub fn from_micros(us: i64) -> TimeDuration {
        TimeDuration(us)
    }

    pub fn from_secs(secs: i64) -> TimeDuration {
        TimeDuration(secs * 1_000_000)
    }

    pub fn micros(self) -> i64 {
        self.0
    }
}

/// Scan order for range queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanDirection {
    Forward,
    Backward,
}

/// A range query over one series: every entry with `param_id == param`
/// and `lowerbound <= time <= upperbound`, emitted in `direction` order.
#[derive(Debug, Clone, Copy)]
pub struct SearchQuery {
    pub param: ParamId,
    pub lowerbound: TimeStamp,
    pub upperbound: TimeStamp,
    pub direction: ScanDirection,
}

impl SearchQuery {
    pub fn forward(param: ParamId, lowerbound: TimeStamp, upperbound: TimeStamp) -> Self {
        Self {
            param,
            lowerbound,
            upperbound,
            direction: ScanDirection::Forward,
        }
    }

    pub fn backward(param: ParamId, lowerbound: TimeStamp, upperbound: TimeStamp) -> Self {
        Self {
            param,
            lowerbound,
            upperbound,
            direction: ScanDirection::Backward,
        }
    }

    /// A query is well-formed iff its bounds are ordered.
    pub fn is_valid(&self) -> bool {
        self.lowerbound <= self.upperbound
    }
}

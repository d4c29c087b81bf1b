//! # Write Cache
//!
//! The cache absorbs writes that arrive slightly out of order and turns
//! them into key-ordered batches for index publication. It is a set of
//! [`Generation`]s keyed by the time bucket `floor(time / window)`:
//! writes route to their bucket's live generation, and when the total
//! live size crosses the budget the oldest bucket is frozen — moved into
//! an ordered pool awaiting the drain worker.
//!
//! ```text
//!            add(time, param, offset)
//!                     │
//!          bucket = time / window
//!                     ▼
//!   live:  { b-1 ──► Generation, b ──► Generation }
//!                     │  budget exceeded
//!                     ▼
//!   frozen: [ oldest ... newest ]  ──pick_last()──►  sorted batch
//! ```
//!
//! Frozen generations are immutable; `pick_last` consumes the oldest one
//! and emits its offsets in `(time, param)` key order, which is exactly
//! the order the page index wants.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, VecDeque};

use crate::error::CacheError;
use crate::types::{EntryOffset, ParamId, TimeDuration, TimeStamp};

use super::generation::Generation;

#[derive(Debug)]
pub struct Cache {
    window: TimeDuration,
    max_entries: usize,
    live: BTreeMap<i64, Generation>,
    frozen: VecDeque<Generation>,
    live_size: usize,
    newest: Option<TimeStamp>,
}

impl Cache {
    /// `window` is the time span of one bucket and the accepted
    /// out-of-order horizon; `max_entries` bounds live entries across all
    /// buckets.
    pub fn new(window: TimeDuration, max_entries: usize) -> Self {
        Self {
            window,
            max_entries: max_entries.max(1),
            live: BTreeMap::new(),
            frozen: VecDeque::new(),
            live_size: 0,
            newest: None,
        }
    }

    fn bucket_of(&self, time: TimeStamp) -> i64 {
        time.0.div_euclid(self.window.0.max(1))
    }

    /// Routes one `(time, param) -> offset` record to its bucket.
    /// Returns the number of drain events the caller should enqueue
    /// (one per generation frozen by this write).
    pub fn add(
        &mut self,
        time: TimeStamp,
        param: ParamId,
        offset: EntryOffset,
    ) -> Result<usize, CacheError> {
        if let Some(newest) = self.newest {
            if time < newest.saturating_sub(self.window) {
                return Err(CacheError::LateWrite);
            }
        }

        let bucket = self.bucket_of(time);
        let generation = match self.live.entry(bucket) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => e.insert(Generation::new(self.window, self.max_entries)),
        };
        generation.add(time, param, offset)?;
        self.live_size += 1;

        if self.newest.map_or(true, |n| time > n) {
            self.newest = Some(time);
        }

        let mut notify = 0;
        while self.live_size >= self.max_entries {
            if !self.freeze_oldest() {
                break;
            }
            notify += 1;
        }
        Ok(notify)
    }

    /// Moves the oldest live generation into the frozen pool. Returns
    /// false when there is nothing left to freeze.
    fn freeze_oldest(&mut self) -> bool {
        let Some((&bucket, _)) = self.live.iter().next() else {
            return false;
        };
        let generation = self.live.remove(&bucket).unwrap_or_else(|| unreachable!());
        self.live_size -= generation.size();
        self.frozen.push_back(generation);
        true
    }

    /// Consumes the oldest frozen generation, writing its offsets into
    /// `out` in `(time, param)` key order, truncated at `out.len()`.
    /// Returns the number written.
    pub fn pick_last(&mut self, out: &mut [EntryOffset]) -> Result<usize, CacheError> {
        let generation = self.frozen.pop_front().ok_or(CacheError::NoData)?;

        let mut n = 0;
        generation.for_each_ordered(|_, _, offset| {
            if n < out.len() {
                out[n] = offset;
                n += 1;
            }
        });
        Ok(n)
    }

    /// Drops live generations whose bucket lies entirely below `horizon`.
    pub fn remove_old(&mut self, horizon: TimeStamp) {
        let window = self.window.0.max(1);
        let dead: Vec<i64> = self
            .live
            .keys()
            .copied()
            .take_while(|&bucket| (bucket + 1).saturating_mul(window) <= horizon.0)
            .collect();

        for bucket in dead {
            if let Some(generation) = self.live.remove(&bucket) {
                self.live_size -= generation.size();
            }
        }
    }

    /// Entries currently held in live generations.
    pub fn live_size(&self) -> usize {
        self.live_size
    }

    /// Frozen generations awaiting drain.
    pub fn frozen_count(&self) -> usize {
        self.frozen.len()
    }
}

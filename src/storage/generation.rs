//! # Generations
//!
//! A generation is the cache's unit of accumulation and drain: an ordered
//! multimap from `(time, param)` to entry offsets, scoped to a fixed time
//! window. Writes that would stretch the represented window beyond the
//! capacity are refused as late; a full generation refuses everything.
//!
//! Offsets inserted under the same key keep their insertion order, both
//! through [`Generation::find`] and through the key-ordered drain — the
//! page index published from a drained generation is therefore stable
//! for duplicate keys.

use std::collections::BTreeMap;

use smallvec::SmallVec;

use crate::error::CacheError;
use crate::types::{EntryOffset, ParamId, TimeDuration, TimeStamp};

type Key = (TimeStamp, ParamId);

/// Time-windowed ordered multimap of `(time, param) -> offset`.
#[derive(Debug)]
pub struct Generation {
    data: BTreeMap<Key, SmallVec<[EntryOffset; 4]>>,
    window: TimeDuration,
    max_entries: usize,
    size: usize,
    newest: Option<TimeStamp>,
}

impl Generation {
    pub fn new(window: TimeDuration, max_entries: usize) -> Self {
        Self {
            data: BTreeMap::new(),
            window,
            max_entries,
            size: 0,
            newest: None,
        }
    }

    /// Records one offset under `(time, param)`.
    pub fn add(
        &mut self,
        time: TimeStamp,
        param: ParamId,
        offset: EntryOffset,
    ) -> Result<(), CacheError> {
        if let Some(newest) = self.newest {
            if time < newest.saturating_sub(self.window) {
                return Err(CacheError::LateWrite);
            }
        }
        if self.size >= self.max_entries {
            return Err(CacheError::Overflow);
        }

        self.data.entry((time, param)).or_default().push(offset);
        self.size += 1;
        if self.newest.map_or(true, |n| time > n) {
            self.newest = Some(time);
        }
        Ok(())
    }

    /// Copies up to `out.len()` offsets stored under `(time, param)` into
    /// `out`, skipping the first `skip` matches. Returns the number
    /// written and whether more matches remain. Matches come back in
    /// insertion order.
    pub fn find(
        &self,
        time: TimeStamp,
        param: ParamId,
        out: &mut [EntryOffset],
        skip: usize,
    ) -> (usize, bool) {
        let Some(offsets) = self.data.get(&(time, param)) else {
            return (0, false);
        };

        let remaining = offsets.len().saturating_sub(skip);
        let n = remaining.min(out.len());
        if n > 0 {
            out[..n].copy_from_slice(&offsets[skip..skip + n]);
        }
        (n, remaining > n)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Earliest timestamp present, if any.
    pub fn oldest(&self) -> Option<TimeStamp> {
        self.data.keys().next().map(|&(t, _)| t)
    }

    /// Latest timestamp ever accepted, if any.
    pub fn newest(&self) -> Option<TimeStamp> {
        self.newest
    }

    pub fn window(&self) -> TimeDuration {
        self.window
    }

    /// Moves the backing storage out, leaving this generation empty but
    /// usable with the same window and budget.
    pub fn take(&mut self) -> Generation {
        Generation {
            data: std::mem::take(&mut self.data),
            window: self.window,
            max_entries: self.max_entries,
            size: std::mem::replace(&mut self.size, 0),
            newest: self.newest.take(),
        }
    }

    /// Visits every offset in `(time, param)` key order, preserving
    /// insertion order for equal keys.
    pub fn for_each_ordered(&self, mut f: impl FnMut(TimeStamp, ParamId, EntryOffset)) {
        for (&(time, param), offsets) in &self.data {
            for &offset in offsets {
                f(time, param, offset);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generation() -> Generation {
        Generation::new(TimeDuration(1000), usize::MAX)
    }

    #[test]
    fn insert_then_find_single_matches() {
        let mut gen = generation();

        for i in 0..100u32 {
            gen.add(TimeStamp(i as i64), i * 2, i * 4).unwrap();
        }

        for i in 0..100u32 {
            let mut out = [0u32; 1];
            let (n, more) = gen.find(TimeStamp(i as i64), i * 2, &mut out, 0);
            assert_eq!(n, 1);
            assert!(!more);
            assert_eq!(out[0], i * 4);
        }
    }

    #[test]
    fn equal_keys_come_back_in_insertion_order() {
        let mut gen = generation();

        for i in 0..1000u32 {
            gen.add(TimeStamp(0), 0, i).unwrap();
        }

        let mut out = vec![0u32; 1000];
        let (n, more) = gen.find(TimeStamp(0), 0, &mut out, 0);
        assert_eq!(n, 1000);
        assert!(!more);
        assert_eq!(out, (0..1000).collect::<Vec<_>>());
    }

    #[test]
    fn find_with_skip_pages_through_matches() {
        let mut gen = generation();
        for i in 0..10u32 {
            gen.add(TimeStamp(0), 1, i).unwrap();
        }

        let mut seen = Vec::new();
        let mut skip = 0;
        loop {
            let mut out = [0u32; 3];
            let (n, more) = gen.find(TimeStamp(0), 1, &mut out, skip);
            seen.extend_from_slice(&out[..n]);
            skip += n;
            if !more {
                break;
            }
        }

        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn find_missing_key_is_empty() {
        let gen = generation();
        let mut out = [0u32; 4];
        assert_eq!(gen.find(TimeStamp(5), 5, &mut out, 0), (0, false));
    }

    #[test]
    fn find_with_skip_past_the_matches_is_empty() {
        let mut gen = generation();
        gen.add(TimeStamp(0), 1, 4).unwrap();

        let mut out = [0u32; 4];
        assert_eq!(gen.find(TimeStamp(0), 1, &mut out, 10), (0, false));
    }

    #[test]
    fn late_write_outside_window_is_refused() {
        let mut gen = generation();

        gen.add(TimeStamp(10_000), 1, 0).unwrap();
        assert_eq!(
            gen.add(TimeStamp(8_999), 1, 4),
            Err(CacheError::LateWrite)
        );
        // Exactly at the horizon is still accepted.
        gen.add(TimeStamp(9_000), 1, 8).unwrap();
    }

    #[test]
    fn overflow_when_budget_spent() {
        let mut gen = Generation::new(TimeDuration(1000), 2);

        gen.add(TimeStamp(0), 1, 0).unwrap();
        gen.add(TimeStamp(1), 1, 4).unwrap();
        assert_eq!(gen.add(TimeStamp(2), 1, 8), Err(CacheError::Overflow));
        assert_eq!(gen.size(), 2);
    }

    #[test]
    fn take_leaves_an_empty_usable_generation() {
        let mut gen = generation();
        gen.add(TimeStamp(1), 1, 4).unwrap();

        let moved = gen.take();

        assert_eq!(moved.size(), 1);
        assert!(gen.is_empty());
        assert_eq!(gen.newest(), None);

        // The drained shell accepts writes again.
        gen.add(TimeStamp(2), 1, 8).unwrap();
        assert_eq!(gen.size(), 1);
    }

    #[test]
    fn oldest_and_newest_track_extremes() {
        let mut gen = generation();
        gen.add(TimeStamp(500), 1, 0).unwrap();
        gen.add(TimeStamp(200), 2, 4).unwrap();
        gen.add(TimeStamp(900), 3, 8).unwrap();

        assert_eq!(gen.oldest(), Some(TimeStamp(200)));
        assert_eq!(gen.newest(), Some(TimeStamp(900)));
    }

    #[test]
    fn ordered_visit_sorts_by_time_then_param() {
        let mut gen = generation();
        gen.add(TimeStamp(2), 1, 0).unwrap();
        gen.add(TimeStamp(1), 9, 4).unwrap();
        gen.add(TimeStamp(1), 3, 8).unwrap();
        gen.add(TimeStamp(1), 3, 12).unwrap();

        let mut keys = Vec::new();
        gen.for_each_ordered(|t, p, off| keys.push((t.0, p, off)));

        assert_eq!(keys, vec![(1, 3, 8), (1, 3, 12), (1, 9, 4), (2, 1, 0)]);
    }
}

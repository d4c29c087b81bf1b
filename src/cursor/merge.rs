//! # Fan-In Merge
//!
//! Merges N individually ordered cursors into one globally ordered
//! stream. Each input keeps a small lookahead buffer; every step emits
//! the head with the smallest (forward) or largest (backward) timestamp,
//! breaking ties toward the lowest input index. The output is ordered
//! whenever each input is — the per-page search cursors feeding this
//! combinator emit in query order by construction.

use std::collections::VecDeque;

use super::{CursorResult, ExternalCursor};
use crate::error::SearchError;
use crate::types::ScanDirection;

/// Lookahead pulled from an input per refill.
const READ_CHUNK: usize = 64;

struct Input {
    cursor: Box<dyn ExternalCursor>,
    lookahead: VecDeque<CursorResult>,
    exhausted: bool,
}

impl Input {
    /// Ensures the lookahead holds at least one result if the input can
    /// still produce any. Returns the input's error, if it failed.
    fn refill(&mut self) -> Option<SearchError> {
        if self.exhausted || !self.lookahead.is_empty() {
            return None;
        }

        let mut buf = [CursorResult::new(0, crate::types::TimeStamp(0)); READ_CHUNK];
        let n = self.cursor.read(&mut buf);
        if n == 0 {
            self.exhausted = true;
            return self.cursor.error();
        }
        self.lookahead.extend(buf[..n].iter().copied());
        None
    }
}

pub struct FanInCursor {
    inputs: Vec<Input>,
    direction: ScanDirection,
    error: Option<SearchError>,
    done: bool,
}

impl FanInCursor {
    pub fn new(cursors: Vec<Box<dyn ExternalCursor>>, direction: ScanDirection) -> Self {
        Self {
            inputs: cursors
                .into_iter()
                .map(|cursor| Input {
                    cursor,
                    lookahead: VecDeque::new(),
                    exhausted: false,
                })
                .collect(),
            direction,
            error: None,
            done: false,
        }
    }

    /// Picks the input whose head comes next in the merge order.
    fn best_input(&self) -> Option<usize> {
        let mut best: Option<(usize, i64)> = None;
        for (i, input) in self.inputs.iter().enumerate() {
            let Some(head) = input.lookahead.front() else {
                continue;
            };
            let ts = head.timestamp.0;
            let wins = match (best, self.direction) {
                (None, _) => true,
                (Some((_, best_ts)), ScanDirection::Forward) => ts < best_ts,
                (Some((_, best_ts)), ScanDirection::Backward) => ts > best_ts,
            };
            if wins {
                best = Some((i, ts));
            }
        }
        best.map(|(i, _)| i)
    }
}

impl ExternalCursor for FanInCursor {
    fn read(&mut self, buf: &mut [CursorResult]) -> usize {
        if self.done || self.error.is_some() {
            return 0;
        }

        let mut filled = 0;
        while filled < buf.len() {
            for input in &mut self.inputs {
                if let Some(error) = input.refill() {
                    self.error = Some(error);
                    self.done = true;
                    return filled;
                }
            }

            let Some(winner) = self.best_input() else {
                self.done = true;
                break;
            };
            buf[filled] = self.inputs[winner]
                .lookahead
                .pop_front()
                .unwrap_or_else(|| unreachable!());
            filled += 1;
        }
        filled
    }

    fn is_done(&self) -> bool {
        self.done || self.error.is_some()
    }

    fn error(&self) -> Option<SearchError> {
        self.error
    }

    fn close(&mut self) {
        for input in &mut self.inputs {
            input.cursor.close();
            input.lookahead.clear();
            input.exhausted = true;
        }
        self.done = true;
    }
}

impl Drop for FanInCursor {
    fn drop(&mut self) {
        self.close();
    }
}

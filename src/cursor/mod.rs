//! # Cursor Framework
//!
//! Searches stream results instead of materializing them. The producer
//! side (a page search, a merge) drives an [`InternalCursor`]; the
//! consumer side pulls from an [`ExternalCursor`] into its own buffer.
//!
//! ```text
//! PageMut::search ──put()──► InternalCursor        ExternalCursor ──read()──► caller
//!                                  │                      ▲
//!                                  └── ChannelCursor ─────┘   (thread-backed bridge)
//! ```
//!
//! Variants:
//!
//! - [`RecordingCursor`]: grows a `Vec`; the test harness cursor.
//! - [`BufferedCursor`]: fills a caller-owned slice; overflow is
//!   silently dropped.
//! - [`DirectPageSyncCursor`]: publishes each offset straight into a
//!   page's sync index, one at a time (maintenance path).
//! - [`channel::ChannelCursor`]: bounded bridge between a producer
//!   thread and a consuming caller.
//! - [`merge::FanInCursor`]: N ordered inputs merged into one ordered
//!   output.
//!
//! A producer must treat a `false` return from `put` as a cancellation
//! request and stop within one record. Errors travel through
//! `set_error`, which also terminates the stream.

pub mod channel;
pub mod merge;

use crate::error::SearchError;
use crate::storage::page::PageMut;
use crate::types::{EntryOffset, TimeStamp};

/// One search hit: the entry's offset inside its page, and its timestamp
/// so downstream merges can order results without re-reading the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorResult {
    pub offset: EntryOffset,
    pub timestamp: TimeStamp,
}

impl CursorResult {
    pub fn new(offset: EntryOffset, timestamp: TimeStamp) -> Self {
        Self { offset, timestamp }
    }
}

/// Producer-side cursor interface.
pub trait InternalCursor {
    /// Delivers one result. Returns `false` when the consumer is gone and
    /// the producer should stop.
    fn put(&mut self, result: CursorResult) -> bool;

    /// Marks the stream finished.
    fn complete(&mut self);

    /// Reports a failure and terminates the stream.
    fn set_error(&mut self, error: SearchError);
}

/// Consumer-side cursor interface.
pub trait ExternalCursor {
    /// Moves up to `buf.len()` results into `buf`; returns the number
    /// moved. Zero means the stream is finished or failed.
    fn read(&mut self, buf: &mut [CursorResult]) -> usize;

    /// True once every result has been consumed or an error occurred.
    fn is_done(&self) -> bool;

    fn error(&self) -> Option<SearchError>;

    /// Tells the producer to stop; outstanding results are discarded.
    fn close(&mut self);
}

/// Stores every result in a growable sequence.
#[derive(Debug, Default)]
pub struct RecordingCursor {
    pub results: Vec<CursorResult>,
    pub completed: bool,
    pub error: Option<SearchError>,
}

impl RecordingCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offsets(&self) -> Vec<EntryOffset> {
        self.results.iter().map(|r| r.offset).collect()
    }

    pub fn timestamps(&self) -> Vec<TimeStamp> {
        self.results.iter().map(|r| r.timestamp).collect()
    }
}

impl InternalCursor for RecordingCursor {
    fn put(&mut self, result: CursorResult) -> bool {
        self.results.push(result);
        true
    }

    fn complete(&mut self) {
        self.completed = true;
    }

    fn set_error(&mut self, error: SearchError) {
        self.error = Some(error);
        self.completed = true;
    }
}

/// Fills a caller-owned buffer; results past its capacity are dropped.
pub struct BufferedCursor<'a> {
    buffer: &'a mut [CursorResult],
    count: usize,
    completed: bool,
    error: Option<SearchError>,
}

impl<'a> BufferedCursor<'a> {
    pub fn new(buffer: &'a mut [CursorResult]) -> Self {
        Self {
            buffer,
            count: 0,
            completed: false,
            error: None,
        }
    }

    /// Results captured so far.
    pub fn results(&self) -> &[CursorResult] {
        &self.buffer[..self.count]
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn error(&self) -> Option<SearchError> {
        self.error
    }
}

impl InternalCursor for BufferedCursor<'_> {
    fn put(&mut self, result: CursorResult) -> bool {
        if self.count < self.buffer.len() {
            self.buffer[self.count] = result;
            self.count += 1;
        }
        true
    }

    fn complete(&mut self) {
        self.completed = true;
    }

    fn set_error(&mut self, error: SearchError) {
        self.error = Some(error);
        self.completed = true;
    }
}

/// Publishes each incoming offset straight into the page's sync index.
/// Used by maintenance passes that republish a sorted index.
pub struct DirectPageSyncCursor<'a> {
    page: PageMut<'a>,
    completed: bool,
    error: Option<SearchError>,
}

impl<'a> DirectPageSyncCursor<'a> {
    pub fn new(page: PageMut<'a>) -> Self {
        Self {
            page,
            completed: false,
            error: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn error(&self) -> Option<SearchError> {
        self.error
    }

    pub fn into_page(self) -> PageMut<'a> {
        self.page
    }
}

impl InternalCursor for DirectPageSyncCursor<'_> {
    fn put(&mut self, result: CursorResult) -> bool {
        self.page.sync_indexes(&[result.offset]) == 1
    }

    fn complete(&mut self) {
        self.completed = true;
    }

    fn set_error(&mut self, error: SearchError) {
        self.error = Some(error);
        self.completed = true;
    }
}

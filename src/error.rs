//! # Error Types
//!
//! Hot-path outcomes that callers dispatch on are small typed enums; the
//! fallible open/create/I-O paths use `eyre` with contextual messages
//! instead (see the `storage` modules). The split keeps `match` on a write
//! status allocation-free while unusual failures still carry full context.

use thiserror::Error;

/// Failure modes of a write, from the page append through cache admission.
#[derive(Debug, Error)]
pub enum WriteError {
    /// The record is smaller than the fixed entry header, or its length
    /// field disagrees with the bytes supplied.
    #[error("entry is smaller than the fixed entry header")]
    BadData,

    /// The record plus one offset-index slot exceed the page's free space.
    #[error("entry does not fit in the remaining page space")]
    PageFull,

    /// The timestamp predates the accepted write horizon; the entry was
    /// not admitted to the cache and will never be indexed.
    #[error("timestamp predates the accepted write horizon")]
    LateWrite,

    /// Rotating to the next volume failed. Carries the underlying report.
    #[error("volume rotation failed: {0}")]
    Rotation(eyre::Report),
}

/// Failure modes of the write cache and its generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The timestamp falls before the generation's accepted window.
    #[error("timestamp predates the generation window")]
    LateWrite,

    /// The generation's entry budget is exhausted.
    #[error("generation entry budget exhausted")]
    Overflow,

    /// No frozen generation is ready to drain.
    #[error("no frozen generation is ready")]
    NoData,
}

/// Errors delivered through a cursor by a failed search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SearchError {
    /// The query bounds are inverted.
    #[error("search query bounds are invalid")]
    BadQuery,
}

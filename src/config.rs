//! # Storage Configuration
//!
//! This module centralizes the tunable surface of the engine and the
//! constants derived from it. Constants that depend on each other are
//! co-located and guarded by compile-time assertions so a change to one
//! cannot silently invalidate another.
//!
//! ## Dependency Graph
//!
//! ```text
//! DEFAULT_VOLUME_SIZE (256 MiB)
//!       │
//!       └─> must fit in a u32 EntryOffset; every byte of a page is
//!           addressed by a 32-bit offset from the page start
//!
//! max_late_write (config)
//!       │
//!       ├─> Cache generation window: one bucket spans this duration
//!       └─> write horizon: entries older than newest - max_late_write
//!           are refused with LateWrite
//!
//! max_cache_entries (config)
//!       │
//!       └─> drain batch buffer size: the worker drains at most one
//!           full generation per event, which is bounded by this
//! ```

use std::path::{Path, PathBuf};

use crate::types::TimeDuration;

/// Default size of one volume file. Every volume in a storage has the
/// same fixed size, set at creation time.
pub const DEFAULT_VOLUME_SIZE: u64 = 256 * 1024 * 1024;

/// Smallest volume size accepted at creation. A volume must hold the
/// page header, at least one index slot, and one minimal entry.
pub const MIN_VOLUME_SIZE: u64 = 4096;

/// Largest volume size addressable by a 32-bit entry offset.
pub const MAX_VOLUME_SIZE: u64 = u32::MAX as u64;

const _: () = assert!(
    DEFAULT_VOLUME_SIZE <= MAX_VOLUME_SIZE,
    "volume bytes must be addressable by a u32 EntryOffset"
);

const _: () = assert!(MIN_VOLUME_SIZE >= 1024, "volume must hold a header and an entry");

/// Default per-storage cap on live cache entries before the oldest
/// generation is frozen for draining.
pub const DEFAULT_MAX_CACHE_ENTRIES: usize = 1_000_000;

/// Default late-write window: writes older than this behind the newest
/// accepted timestamp are refused.
pub const DEFAULT_MAX_LATE_WRITE: TimeDuration = TimeDuration(10_000_000);

/// Configuration consumed by [`crate::storage::Storage::open`].
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Path of the metadata catalog file listing the volumes.
    pub metadata_path: PathBuf,
    /// Window of accepted out-of-order writes; also the time span of one
    /// cache generation.
    pub max_late_write: TimeDuration,
    /// Total live entries across cache generations before the oldest
    /// bucket is frozen for draining.
    pub max_cache_entries: usize,
}

impl StorageConfig {
    pub fn new<P: AsRef<Path>>(metadata_path: P) -> Self {
        Self {
            metadata_path: metadata_path.as_ref().to_path_buf(),
            max_late_write: DEFAULT_MAX_LATE_WRITE,
            max_cache_entries: DEFAULT_MAX_CACHE_ENTRIES,
        }
    }

    pub fn max_late_write(mut self, window: TimeDuration) -> Self {
        self.max_late_write = window;
        self
    }

    pub fn max_cache_entries(mut self, entries: usize) -> Self {
        self.max_cache_entries = entries.max(1);
        self
    }
}

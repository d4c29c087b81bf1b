//! # ChronoPage - Time-Series Storage Core
//!
//! ChronoPage is the persistence engine of a time-series database: an
//! append-mostly core that stores `(param_id, timestamp, payload)` tuples
//! in a rotating set of fixed-size, memory-mapped page files and serves
//! range queries over `(param_id, [t_lo, t_hi])` in either scan order.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       Storage (write / search / stop)    │
//! ├─────────────────────────────────────────┤
//! │  Volume rotation  │  Drain worker        │
//! ├───────────────────┼─────────────────────┤
//! │   Write Cache (generations)              │
//! ├─────────────────────────────────────────┤
//! │   Page (offset index, bbox, search)      │
//! ├─────────────────────────────────────────┤
//! │   Memory-mapped volume files             │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Writes append into the active volume's page and become durable in
//! append order immediately; a time-bucketed cache re-orders slightly
//! late arrivals and a background worker publishes sorted batches into
//! the page's offset index. Reads run an interpolated-then-binary search
//! over each page and merge per-volume streams through the cursor
//! framework.
//!
//! ## Quick Start
//!
//! ```ignore
//! use chronopage::{create_storage, SearchQuery, Storage, StorageConfig, TimeStamp};
//!
//! let meta = create_storage("db", meta_dir, vol_dir, 4, 256 << 20)?;
//! let storage = Storage::open(StorageConfig::new(meta))?;
//!
//! storage.write(42, TimeStamp::utc_now(), b"reading")?;
//!
//! let mut cursor = storage.search(SearchQuery::forward(42, t_lo, t_hi));
//! let mut buf = [chronopage::CursorResult::new(0, TimeStamp(0)); 128];
//! loop {
//!     let n = cursor.read(&mut buf);
//!     if n == 0 { break; }
//!     // resolve offsets against the owning page
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`storage`]: pages, volumes, cache, metadata, the engine
//! - [`cursor`]: producer/consumer streaming between searches and callers
//! - [`types`]: timestamps, identifiers, queries
//! - [`config`]: tunables and layout constants
//! - [`error`]: typed hot-path statuses
//!
//! ## What ChronoPage Is Not
//!
//! No transactions, no per-entry deletion, no secondary indexes beyond
//! the per-page timestamp-ordered offset array, no replication, no query
//! language. It is the layer such features are built on.

pub mod config;
pub mod cursor;
pub mod error;
pub mod storage;
pub mod types;

pub use config::{StorageConfig, DEFAULT_MAX_CACHE_ENTRIES, DEFAULT_VOLUME_SIZE};
pub use cursor::{
    channel::ChannelCursor, merge::FanInCursor, BufferedCursor, CursorResult, ExternalCursor,
    InternalCursor, RecordingCursor,
};
pub use error::{CacheError, SearchError, WriteError};
pub use storage::{create_storage, Storage};
pub use types::{
    EntryOffset, ParamId, ScanDirection, SearchQuery, TimeDuration, TimeStamp,
};

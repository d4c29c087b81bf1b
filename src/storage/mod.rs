//! # Storage Layer
//!
//! The persistence core: fixed-size memory-mapped page files rotated in
//! round-robin order, a time-bucketed write cache in front of each, and
//! a background worker publishing cache batches into the on-disk offset
//! index.
//!
//! ## Data Flow
//!
//! ```text
//! writer ──► Storage::write ──► active Volume
//!                                 │ page append (immediately durable,
//!                                 │ append order)
//!                                 ▼
//!                               Cache ── freeze ──► drain worker
//!                                                      │
//!                                       page.sync_indexes(sorted batch)
//!                                                      ▼
//! reader ──► Storage::search ──► per-volume page search ──► fan-in merge
//! ```
//!
//! ## Module Organization
//!
//! - `mmap`: fixed-size mapped file with destructive remap (`VolumeFile`)
//! - `entry`: the on-disk record codec
//! - `page`: page header, offset index, bounding box, search
//! - `generation`: time-windowed ordered multimap
//! - `cache`: bucketed generations with freeze/drain lifecycle
//! - `volume`: one page file plus its cache
//! - `metadata`: JSON volume catalog, storage provisioning
//! - `engine`: volume set, rotation, drain worker, public write/search
//!
//! ## Crash Counters
//!
//! Every page carries `open_count`/`close_count` in its mapped header.
//! A clean close levels them; a crash leaves the active page one ahead.
//! Open-time volume election keys off these counters and finishes any
//! rotation the crash interrupted.

pub mod cache;
pub mod engine;
pub mod entry;
pub mod generation;
pub mod metadata;
pub mod mmap;
pub mod page;
pub mod volume;

pub use cache::Cache;
pub use engine::Storage;
pub use entry::{decode_entry, encode_entry, EntryHeader, ENTRY_HEADER_SIZE};
pub use generation::Generation;
pub use metadata::{create_storage, StorageMetadata};
pub use mmap::VolumeFile;
pub use page::{
    PageBoundingBox, PageHeader, PageKind, PageMut, PageRef, INTERPOLATION_SEARCH_CUTOFF,
    INTERPOLATION_SEARCH_QUOTA, PAGE_MAGIC,
};
pub use volume::Volume;

/// Size of the page header at the start of every volume file.
pub const PAGE_HEADER_SIZE: usize = 80;

/// Size of one offset-index slot.
pub const INDEX_SLOT_SIZE: usize = 4;

const _: () = assert!(
    PAGE_HEADER_SIZE % INDEX_SLOT_SIZE == 0,
    "page_index must start aligned to its slot size"
);

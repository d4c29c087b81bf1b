//! # Storage Engine
//!
//! The engine owns the volume set and wires the write path to the drain
//! worker:
//!
//! ```text
//! write(param, time, payload)
//!   │ append under the active volume's writer lock
//!   │     overflow? ── advance_volume ── retry
//!   ▼
//! cache.add(time, param, offset)
//!   │ freeze hint
//!   ▼
//! drain queue ──► worker: pick_last() ──► page.sync_indexes()
//! ```
//!
//! Readers never touch the queue: `search` fans per-volume cursors into
//! one merged, time-ordered stream.
//!
//! ## Rotation
//!
//! The active volume is an atomic revision; the volume at `rev % N` is
//! active. Writers race to rotate on overflow: the rotation mutex admits
//! one, which closes the full page, wipes the next volume in round-robin
//! order, and reopens it; losers observe the advanced revision and
//! simply retry their write. On open, the volume with the highest
//! `open_count` is active (ties break to the highest index); when its
//! counters are level the previous process died mid-rotation and the
//! rotation is finished before accepting writes.
//!
//! ## Worker
//!
//! One background thread parks on a condvar until drain events arrive.
//! Each event names a volume; the worker consumes the oldest frozen
//! cache generation and publishes its key-ordered offsets into the
//! page's sync index. Shutdown drains the queue fully before the thread
//! exits, so hinted batches are never silently dropped.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use eyre::{Result, WrapErr};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, warn};

use crate::config::StorageConfig;
use crate::cursor::channel::{ChannelCursor, DEFAULT_CHANNEL_CAPACITY};
use crate::cursor::merge::FanInCursor;
use crate::cursor::{ExternalCursor, InternalCursor};
use crate::error::WriteError;
use crate::types::{EntryOffset, ParamId, SearchQuery, TimeStamp};

use super::entry::decode_entry;
use super::metadata::StorageMetadata;
use super::page::{PageMut, PageRef};
use super::volume::Volume;

struct StorageInner {
    volumes: Vec<Arc<Volume>>,
    /// Monotonic rotation revision; the active volume is `rev % N`.
    active: AtomicUsize,
    rotation: Mutex<()>,
    queue: Mutex<VecDeque<usize>>,
    queue_ready: Condvar,
    stop_worker: AtomicBool,
    drain_capacity: usize,
}

pub struct Storage {
    inner: Arc<StorageInner>,
    worker: Option<JoinHandle<()>>,
}

impl Storage {
    /// Opens an existing storage from its metadata catalog, selects the
    /// active volume, and starts the drain worker.
    pub fn open(config: StorageConfig) -> Result<Storage> {
        let paths = StorageMetadata::load(&config.metadata_path)?;

        let volumes = paths
            .iter()
            .map(|path| {
                Volume::open(path, config.max_late_write, config.max_cache_entries).map(Arc::new)
            })
            .collect::<Result<Vec<_>>>()?;

        let inner = Arc::new(StorageInner {
            volumes,
            active: AtomicUsize::new(0),
            rotation: Mutex::new(()),
            queue: Mutex::new(VecDeque::new()),
            queue_ready: Condvar::new(),
            stop_worker: AtomicBool::new(false),
            drain_capacity: config.max_cache_entries,
        });

        select_active_page(&inner)
            .wrap_err("failed to select the active volume at open")?;

        let worker_inner = Arc::clone(&inner);
        let worker = thread::Builder::new()
            .name("chronopage-drain".into())
            .spawn(move || run_worker(worker_inner))
            .wrap_err("failed to spawn the drain worker")?;

        info!(
            volumes = inner.volumes.len(),
            active = inner.active.load(Ordering::Acquire) % inner.volumes.len(),
            "storage open"
        );

        Ok(Storage {
            inner,
            worker: Some(worker),
        })
    }

    /// Physical index of the volume currently accepting writes.
    pub fn active_volume_index(&self) -> usize {
        self.inner.active.load(Ordering::Acquire) % self.inner.volumes.len()
    }

    pub fn volume_count(&self) -> usize {
        self.inner.volumes.len()
    }

    /// Appends one entry from a borrowed payload. On success the entry is
    /// durable in the page in append order and queued for index
    /// publication. A `LateWrite` means the bytes landed in the page but
    /// will never be published through the sorted index.
    pub fn write(
        &self,
        param: ParamId,
        time: TimeStamp,
        payload: &[u8],
    ) -> Result<EntryOffset, WriteError> {
        loop {
            let rev = self.inner.active.load(Ordering::Acquire);
            let volume = &self.inner.volumes[rev % self.inner.volumes.len()];

            let appended = {
                let mut file = volume.file.write();
                match PageMut::new(file.as_mut_slice()) {
                    Ok(mut page) => page.add_payload(param, time, payload),
                    Err(e) => return Err(WriteError::Rotation(e)),
                }
            };

            match appended {
                Ok(offset) => {
                    let hint = volume.cache.lock().add(time, param, offset);
                    return match hint {
                        Ok(0) => Ok(offset),
                        Ok(n) => {
                            self.notify_worker(n, rev % self.inner.volumes.len());
                            Ok(offset)
                        }
                        // The cache refuses nothing but late writes here:
                        // its generations carry no budget of their own.
                        Err(_) => Err(WriteError::LateWrite),
                    };
                }
                Err(WriteError::PageFull) => {
                    self.advance_volume(rev).map_err(WriteError::Rotation)?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Appends one pre-encoded record (header + payload in one buffer).
    pub fn write_entry(&self, record: &[u8]) -> Result<EntryOffset, WriteError> {
        let Ok((header, payload)) = decode_entry(record) else {
            return Err(WriteError::BadData);
        };
        self.write(header.param_id(), header.time(), payload)
    }

    /// Streams every entry matching `query` across all volumes, merged
    /// in query order. Each volume is scanned by its own producer thread
    /// under the volume's read lock.
    pub fn search(&self, query: SearchQuery) -> FanInCursor {
        let cursors: Vec<Box<dyn ExternalCursor>> = self
            .inner
            .volumes
            .iter()
            .map(|volume| {
                let volume = Arc::clone(volume);
                let cursor = ChannelCursor::spawn(DEFAULT_CHANNEL_CAPACITY, move |producer| {
                    let file = volume.file.read();
                    file.prefetch(0, file.len() as usize);
                    match PageRef::new(file.as_slice()) {
                        Ok(page) => page.search(&query, producer),
                        Err(e) => {
                            warn!("skipping unreadable volume in search: {e}");
                            producer.complete();
                        }
                    }
                });
                Box::new(cursor) as Box<dyn ExternalCursor>
            })
            .collect();

        FanInCursor::new(cursors, query.direction)
    }

    /// Flushes every volume's mapped region to disk.
    pub fn commit(&self) -> Result<()> {
        for volume in &self.inner.volumes {
            volume.flush()?;
        }
        Ok(())
    }

    /// Stops the drain worker after it has drained the queue, then
    /// flushes the volumes. Idempotent; also run by `Drop`.
    pub fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.inner.stop_worker.store(true, Ordering::Release);
            self.inner.queue_ready.notify_all();
            if worker.join().is_err() {
                error!("drain worker panicked");
            }
            if let Err(e) = self.commit() {
                error!("final flush failed: {e}");
            }
            debug!("storage stopped");
        }
    }

    fn notify_worker(&self, events: usize, volume_index: usize) {
        {
            let mut queue = self.inner.queue.lock();
            for _ in 0..events {
                queue.push_back(volume_index);
            }
        }
        self.inner.queue_ready.notify_one();
    }

    fn advance_volume(&self, rev: usize) -> Result<()> {
        advance_volume(&self.inner, rev)
    }
}

/// Rotates to the next volume in round-robin order. Only the first
/// caller whose observed revision still matches performs the rotation;
/// everyone else returns and retries their write against the new active
/// volume.
fn advance_volume(inner: &StorageInner, rev: usize) -> Result<()> {
    let _guard = inner.rotation.lock();
    if rev != inner.active.load(Ordering::Acquire) {
        return Ok(());
    }

    let n = inner.volumes.len();
    let old = &inner.volumes[rev % n];
    let next_rev = rev + 1;
    let next = &inner.volumes[next_rev % n];

    close_if_open(old)?;
    next.reallocate_disc_space()?;
    next.open_for_writes()?;

    inner.active.store(next_rev, Ordering::Release);
    info!(from = rev % n, to = next_rev % n, "rotated active volume");
    Ok(())
}

impl Drop for Storage {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Closes the volume's page unless it is already idle. Keeps
/// `open_count - close_count` inside `{0, 1}` when a rotation repairs a
/// page that an interrupted shutdown already closed.
fn close_if_open(volume: &Volume) -> Result<()> {
    let already_closed = {
        let file = volume.file.read();
        let page = PageRef::new(file.as_slice())?;
        page.header().open_count() == page.header().close_count()
    };
    if already_closed {
        return Ok(());
    }
    volume.close_for_writes()
}

/// Picks the volume with the greatest `open_count` (ties to the greatest
/// index) as active. Level counters on the winner mean the previous
/// shutdown happened between `close()` and reopening the next volume;
/// the rotation is finished here so the storage comes up writable.
fn select_active_page(inner: &StorageInner) -> Result<()> {
    let mut max_open = -1i64;
    let mut max_index = 0usize;

    for (i, volume) in inner.volumes.iter().enumerate() {
        let file = volume.file.read();
        let page = PageRef::new(file.as_slice())?;
        let open_count = page.header().open_count() as i64;
        if open_count >= max_open {
            max_open = open_count;
            max_index = i;
        }
    }

    inner.active.store(max_index, Ordering::Release);

    let interrupted = {
        let volume = &inner.volumes[max_index];
        let file = volume.file.read();
        let page = PageRef::new(file.as_slice())?;
        page.header().open_count() == page.header().close_count()
    };

    if interrupted {
        warn!(volume = max_index, "finishing interrupted rotation");
        advance_volume(inner, max_index)?;
    }

    Ok(())
}

fn run_worker(inner: Arc<StorageInner>) {
    debug!("drain worker started");
    let mut buffer = vec![0u32; inner.drain_capacity.max(1)];

    loop {
        let volume_index = {
            let mut queue = inner.queue.lock();
            loop {
                if let Some(&index) = queue.front() {
                    break index;
                }
                if inner.stop_worker.load(Ordering::Acquire) {
                    debug!("drain worker exiting, queue empty");
                    return;
                }
                inner.queue_ready.wait(&mut queue);
            }
        };

        let volume = Arc::clone(&inner.volumes[volume_index]);

        // The cache lock is released before the file lock is taken; the
        // worker never holds both at once.
        let picked = volume.cache.lock().pick_last(&mut buffer);
        match picked {
            Ok(n) => {
                let mut file = volume.file.write();
                match PageMut::new(file.as_mut_slice()) {
                    Ok(mut page) => {
                        let published = page.sync_indexes(&buffer[..n]);
                        debug!(volume = volume_index, published, "drained generation");
                    }
                    Err(e) => error!(volume = volume_index, "drain skipped a bad page: {e}"),
                }
            }
            Err(_) => {
                // A rotation reset the cache, or the hint outran the
                // freeze; nothing to publish for this event.
                debug!(volume = volume_index, "drain event found no data");
            }
        }

        inner.queue.lock().pop_front();
    }
}

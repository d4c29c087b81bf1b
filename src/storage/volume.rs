//! # Volumes
//!
//! A volume couples one mapped page file with its write-through cache.
//! The engine shares volumes across the writer, the drain worker, and
//! readers, so the mapped region lives behind a `RwLock`: the writer and
//! the drainer take the write side, searches take the read side. The
//! cache has its own mutex and is never held together with the file
//! write lock by more than one component.

use std::path::{Path, PathBuf};

use eyre::{Result, WrapErr};
use parking_lot::{Mutex, RwLock};
use tracing::warn;

use crate::types::TimeDuration;

use super::cache::Cache;
use super::mmap::VolumeFile;
#[cfg(test)]
use super::page::PageKind;
use super::page::PageMut;

pub struct Volume {
    pub(crate) file: RwLock<VolumeFile>,
    pub(crate) cache: Mutex<Cache>,
    path: PathBuf,
    window: TimeDuration,
    max_cache_entries: usize,
}

impl Volume {
    /// Maps an existing volume file and validates its page header.
    pub fn open<P: AsRef<Path>>(
        path: P,
        window: TimeDuration,
        max_cache_entries: usize,
    ) -> Result<Self> {
        let path = path.as_ref();
        let mut file = VolumeFile::open(path)?;

        PageMut::new(file.as_mut_slice())
            .wrap_err_with(|| format!("volume '{}' carries a bad page", path.display()))?;

        Ok(Self {
            file: RwLock::new(file),
            cache: Mutex::new(Cache::new(window, max_cache_entries)),
            path: path.to_path_buf(),
            window,
            max_cache_entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Prepares the page for writes and persists the counter bump.
    pub fn open_for_writes(&self) -> Result<()> {
        let mut file = self.file.write();
        let mut page = PageMut::new(file.as_mut_slice())?;
        page.reuse();
        file.flush()
    }

    /// Closes the page for writes and persists the counter bump.
    pub fn close_for_writes(&self) -> Result<()> {
        let mut file = self.file.write();
        let mut page = PageMut::new(file.as_mut_slice())?;
        page.close();
        file.flush()
    }

    /// Destructively remaps the file and formats a fresh page, carrying
    /// the page id and open/close counters across the wipe. The cache is
    /// reset alongside: its offsets pointed into the discarded contents.
    pub fn reallocate_disc_space(&self) -> Result<()> {
        {
            let mut file = self.file.write();

            let (page_id, open_count, close_count, kind) = {
                let page = PageMut::new(file.as_mut_slice())?;
                let header = page.header();
                (
                    header.page_id(),
                    header.open_count(),
                    header.close_count(),
                    header.kind(),
                )
            };

            file.remap_destructive()?;

            let mut page = PageMut::format(file.as_mut_slice(), kind, page_id)?;
            page.restore_counters(page_id, open_count, close_count);
        }

        let mut cache = self.cache.lock();
        if cache.frozen_count() > 0 || cache.live_size() > 0 {
            warn!(
                path = %self.path.display(),
                live = cache.live_size(),
                frozen = cache.frozen_count(),
                "discarding undrained cache entries with the reused volume"
            );
        }
        *cache = Cache::new(self.window, self.max_cache_entries);
        Ok(())
    }

    /// Flushes the mapped region to disk.
    pub fn flush(&self) -> Result<()> {
        self.file.read().flush()
    }
}

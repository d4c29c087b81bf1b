//! # Memory-Mapped Volume Files
//!
//! This module implements `VolumeFile`, the low-level building block that
//! maps one fixed-size page file into the process address space. Each
//! volume file is a single page: the header at offset 0, the offset index
//! growing forward behind it, and record bytes growing backward from the
//! end (see `page`).
//!
//! ## Design Philosophy
//!
//! Traditional engines copy page data between kernel buffers and a
//! user-space page cache. Memory-mapped I/O eliminates that copy by
//! mapping the file directly; the OS page cache becomes the buffer pool.
//!
//! ## Safety Considerations
//!
//! A mapped region becomes invalid when the file is remapped. Rather than
//! hazard pointers or epochs, `VolumeFile` leans on the borrow checker:
//!
//! ```text
//! as_slice(&self) -> &[u8]          // immutable borrow of self
//! as_mut_slice(&mut self) -> &mut [u8]  // exclusive borrow
//! remap_destructive(&mut self)      // exclusive borrow
//! ```
//!
//! Since `remap_destructive()` takes `&mut self`, no slice into the old
//! mapping can outlive the remap. Cross-thread sharing is the next layer's
//! concern: `Volume` wraps the file in a `parking_lot::RwLock`.
//!
//! ## Error Handling
//!
//! All fallible operations return `eyre::Result` with the file path and
//! operation in context.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use eyre::{ensure, Result, WrapErr};
use memmap2::MmapMut;

use crate::config::{MAX_VOLUME_SIZE, MIN_VOLUME_SIZE};

#[derive(Debug)]
pub struct VolumeFile {
    file: File,
    mmap: MmapMut,
    len: u64,
    path: PathBuf,
}

impl VolumeFile {
    /// Creates a volume file of exactly `size` bytes, zero-filled, and
    /// maps it. An existing file at `path` is truncated.
    pub fn create<P: AsRef<Path>>(path: P, size: u64) -> Result<Self> {
        let path = path.as_ref();

        ensure!(
            (MIN_VOLUME_SIZE..=MAX_VOLUME_SIZE).contains(&size),
            "volume size {} outside the accepted range [{}, {}]",
            size,
            MIN_VOLUME_SIZE,
            MAX_VOLUME_SIZE
        );

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .wrap_err_with(|| format!("failed to create volume file '{}'", path.display()))?;

        file.set_len(size)
            .wrap_err_with(|| format!("failed to size volume file to {} bytes", size))?;

        // SAFETY: MmapMut::map_mut is unsafe because a memory-mapped file
        // can be modified externally. This is safe because:
        // 1. The file was just created with truncate=true and is owned by
        //    this process for the lifetime of the mapping
        // 2. The file length was set before mapping
        // 3. The mmap lifetime is tied to VolumeFile, preventing
        //    use-after-unmap
        let mmap = unsafe {
            MmapMut::map_mut(&file)
                .wrap_err_with(|| format!("failed to memory-map '{}'", path.display()))?
        };

        Ok(Self {
            file,
            mmap,
            len: size,
            path: path.to_path_buf(),
        })
    }

    /// Maps an existing volume file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .wrap_err_with(|| format!("failed to open volume file '{}'", path.display()))?;

        let len = file
            .metadata()
            .wrap_err_with(|| format!("failed to stat '{}'", path.display()))?
            .len();

        ensure!(
            (MIN_VOLUME_SIZE..=MAX_VOLUME_SIZE).contains(&len),
            "volume file '{}' has size {} outside the accepted range [{}, {}]",
            path.display(),
            len,
            MIN_VOLUME_SIZE,
            MAX_VOLUME_SIZE
        );

        // SAFETY: see `create`; additionally the length was validated
        // against the accepted volume range above.
        let mmap = unsafe {
            MmapMut::map_mut(&file)
                .wrap_err_with(|| format!("failed to memory-map '{}'", path.display()))?
        };

        Ok(Self {
            file,
            mmap,
            len,
            path: path.to_path_buf(),
        })
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.mmap
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.mmap
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Synchronizes the mapping to disk.
    pub fn flush(&self) -> Result<()> {
        self.mmap
            .flush()
            .wrap_err_with(|| format!("failed to flush volume '{}'", self.path.display()))
    }

    /// Drops the current mapping and maps the file again. The contents are
    /// not flushed first: the caller is reinitializing the region and the
    /// previous contents are dead (volume reuse during rotation).
    pub fn remap_destructive(&mut self) -> Result<()> {
        // SAFETY: remap under &mut self; the borrow checker guarantees no
        // slice into the old mapping survives this call. The old mapping
        // is dropped when the new one is assigned.
        self.mmap = unsafe {
            MmapMut::map_mut(&self.file)
                .wrap_err_with(|| format!("failed to remap volume '{}'", self.path.display()))?
        };
        Ok(())
    }

    /// Hints the kernel that `len` bytes starting at `offset` will be
    /// read soon. Advisory only.
    pub fn prefetch(&self, offset: usize, len: usize) {
        if offset >= self.mmap.len() {
            return;
        }

        let len = len.min(self.mmap.len() - offset);

        #[cfg(unix)]
        // SAFETY: madvise with MADV_WILLNEED is a hint and cannot cause
        // undefined behavior for a valid range; offset and len were
        // clamped to the mapping bounds above.
        unsafe {
            libc::madvise(
                self.mmap.as_ptr().add(offset) as *mut libc::c_void,
                len,
                libc::MADV_WILLNEED,
            );
        }
        #[cfg(not(unix))]
        let _ = (offset, len);
    }
}

//! # Metadata Catalog
//!
//! The root of a storage is a small JSON file naming its volumes:
//!
//! ```json
//! {
//!   "creation_time": "Tue, 01 Jul 2026 10:15:00 +0000",
//!   "num_volumes": 2,
//!   "volumes": [
//!     { "index": 0, "path": "/data/db_0.volume" },
//!     { "index": 1, "path": "/data/db_1.volume" }
//!   ]
//! }
//! ```
//!
//! The catalog is written once by [`create_storage`] and read at every
//! open. A catalog with zero volumes, a missing or duplicate index, or
//! an empty path is rejected — those are structural faults, fatal at
//! open time.

use std::fs;
use std::path::{Path, PathBuf};

use eyre::{ensure, Result, WrapErr};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::mmap::VolumeFile;
use super::page::{PageKind, PageMut};

pub const VOLUME_FILE_EXTENSION: &str = "volume";
pub const METADATA_FILE_EXTENSION: &str = "chrono";

#[derive(Debug, Serialize, Deserialize)]
pub struct VolumeRecord {
    pub index: u32,
    pub path: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StorageMetadata {
    pub creation_time: String,
    pub num_volumes: u32,
    pub volumes: Vec<VolumeRecord>,
}

impl StorageMetadata {
    /// Reads and validates the catalog; the returned paths are ordered
    /// by volume index.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Vec<PathBuf>> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read metadata file '{}'", path.display()))?;
        let meta: StorageMetadata = serde_json::from_str(&raw)
            .wrap_err_with(|| format!("failed to parse metadata file '{}'", path.display()))?;

        ensure!(meta.num_volumes > 0, "storage metadata lists no volumes");
        ensure!(
            meta.volumes.len() == meta.num_volumes as usize,
            "storage metadata names {} volumes but lists {}",
            meta.num_volumes,
            meta.volumes.len()
        );

        let mut ordered: Vec<Option<PathBuf>> = vec![None; meta.num_volumes as usize];
        for record in meta.volumes {
            ensure!(
                (record.index as usize) < ordered.len(),
                "volume index {} out of range",
                record.index
            );
            ensure!(
                !record.path.as_os_str().is_empty(),
                "volume {} has an empty path",
                record.index
            );
            ensure!(
                ordered[record.index as usize].is_none(),
                "volume index {} listed twice",
                record.index
            );
            ordered[record.index as usize] = Some(record.path);
        }

        // Every slot is filled: lengths matched and no index repeated.
        Ok(ordered.into_iter().flatten().collect())
    }

    fn write<P: AsRef<Path>>(path: P, volume_paths: &[PathBuf]) -> Result<()> {
        let meta = StorageMetadata {
            creation_time: chrono::Utc::now().to_rfc2822(),
            num_volumes: volume_paths.len() as u32,
            volumes: volume_paths
                .iter()
                .enumerate()
                .map(|(i, p)| VolumeRecord {
                    index: i as u32,
                    path: p.clone(),
                })
                .collect(),
        };

        let raw = serde_json::to_string_pretty(&meta).wrap_err("failed to serialize metadata")?;
        fs::write(path.as_ref(), raw).wrap_err_with(|| {
            format!(
                "failed to write metadata file '{}'",
                path.as_ref().display()
            )
        })
    }
}

/// Creates one formatted volume file. Volume 0 is opened for writes
/// immediately so a freshly created storage is writable.
fn create_volume_file(path: &Path, index: u32, volume_size: u64) -> Result<()> {
    let mut file = VolumeFile::create(path, volume_size)?;
    let mut page = PageMut::format(file.as_mut_slice(), PageKind::Index, index)?;
    if index == 0 {
        page.reuse();
    }
    file.flush()
}

/// Provisions a new storage: `num_volumes` page files named
/// `<name>_<ix>.volume` under `volumes_dir`, plus the `<name>.chrono`
/// catalog under `metadata_dir`. Returns the catalog path.
///
/// When any step fails, volume files created so far are deleted so a
/// failed create leaves no debris behind.
pub fn create_storage(
    name: &str,
    metadata_dir: &Path,
    volumes_dir: &Path,
    num_volumes: u32,
    volume_size: u64,
) -> Result<PathBuf> {
    ensure!(num_volumes > 0, "a storage needs at least one volume");

    fs::create_dir_all(volumes_dir)
        .wrap_err_with(|| format!("failed to create '{}'", volumes_dir.display()))?;
    fs::create_dir_all(metadata_dir)
        .wrap_err_with(|| format!("failed to create '{}'", metadata_dir.display()))?;

    let volume_paths: Vec<PathBuf> = (0..num_volumes)
        .map(|ix| volumes_dir.join(format!("{}_{}.{}", name, ix, VOLUME_FILE_EXTENSION)))
        .collect();

    let mut created: Vec<&PathBuf> = Vec::with_capacity(volume_paths.len());
    for (ix, path) in volume_paths.iter().enumerate() {
        if let Err(e) = create_volume_file(path, ix as u32, volume_size) {
            error!(volume = ix, "volume creation failed, cleaning up");
            remove_files(&created);
            return Err(e).wrap_err_with(|| format!("failed to create volume {}", ix));
        }
        created.push(path);
    }

    let metadata_path =
        metadata_dir.join(format!("{}.{}", name, METADATA_FILE_EXTENSION));
    if let Err(e) = StorageMetadata::write(&metadata_path, &volume_paths) {
        error!("metadata creation failed, cleaning up volumes");
        remove_files(&created);
        return Err(e);
    }

    info!(
        volumes = num_volumes,
        size = volume_size,
        path = %metadata_path.display(),
        "created storage"
    );
    Ok(metadata_path)
}

fn remove_files(paths: &[&PathBuf]) {
    for path in paths {
        if let Err(e) = fs::remove_file(path) {
            error!(path = %path.display(), "failed to remove file during cleanup: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_then_load_roundtrips_volume_order() {
        let dir = tempdir().unwrap();
        let meta = create_storage("db", dir.path(), dir.path(), 3, 8192).unwrap();

        let paths = StorageMetadata::load(&meta).unwrap();
        assert_eq!(paths.len(), 3);
        for (ix, path) in paths.iter().enumerate() {
            assert!(path.ends_with(format!("db_{}.volume", ix)));
            assert!(path.exists());
        }
    }

    #[test]
    fn first_volume_is_opened_for_writes() {
        let dir = tempdir().unwrap();
        let meta = create_storage("db", dir.path(), dir.path(), 2, 8192).unwrap();
        let paths = StorageMetadata::load(&meta).unwrap();

        let mut file0 = VolumeFile::open(&paths[0]).unwrap();
        let page0 = PageMut::new(file0.as_mut_slice()).unwrap();
        assert_eq!(page0.header().open_count(), 1);

        let mut file1 = VolumeFile::open(&paths[1]).unwrap();
        let page1 = PageMut::new(file1.as_mut_slice()).unwrap();
        assert_eq!(page1.header().open_count(), 0);
        assert_eq!(page1.header().page_id(), 1);
    }

    #[test]
    fn zero_volumes_is_rejected() {
        let dir = tempdir().unwrap();
        assert!(create_storage("db", dir.path(), dir.path(), 0, 8192).is_err());
    }

    #[test]
    fn load_rejects_duplicate_index() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.chrono");
        fs::write(
            &path,
            r#"{ "creation_time": "x", "num_volumes": 2,
                 "volumes": [ {"index": 0, "path": "/a"}, {"index": 0, "path": "/b"} ] }"#,
        )
        .unwrap();

        assert!(StorageMetadata::load(&path).is_err());
    }

    #[test]
    fn load_rejects_empty_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.chrono");
        fs::write(
            &path,
            r#"{ "creation_time": "x", "num_volumes": 1,
                 "volumes": [ {"index": 0, "path": ""} ] }"#,
        )
        .unwrap();

        assert!(StorageMetadata::load(&path).is_err());
    }

    #[test]
    fn load_rejects_invalid_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.chrono");
        fs::write(&path, "{ not json").unwrap();

        assert!(StorageMetadata::load(&path).is_err());
    }

    #[test]
    fn failed_create_cleans_up_volumes() {
        let dir = tempdir().unwrap();
        // Undersized volume makes create_volume_file fail on volume 0.
        let result = create_storage("db", dir.path(), dir.path(), 2, 16);
        assert!(result.is_err());
        assert!(!dir.path().join("db_0.volume").exists());
        assert!(!dir.path().join("db_1.volume").exists());
    }
}

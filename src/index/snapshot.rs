//! Snapshot files
//!
//! One file per generation, named by unix timestamp. A new generation is
//! written to a temp file, fsynced and renamed into place before any older
//! generation is removed, so a torn write is never taken for the latest one.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::dir;
use crate::error::Result;

/// File extension of snapshot files
pub const SNAPSHOT_EXTENSION: &str = "idx";

/// Extension of an in-progress snapshot
const TEMP_EXTENSION: &str = "tmp";

/// Path of snapshot generation `id` inside `index_dir`
pub fn snapshot_path(index_dir: &Path, id: u64) -> PathBuf {
    dir::file_path(index_dir, id, SNAPSHOT_EXTENSION)
}

/// Highest snapshot generation in `index_dir`, if any
pub fn latest_snapshot_id(index_dir: &Path) -> Result<Option<u64>> {
    Ok(dir::list_file_ids(index_dir, SNAPSHOT_EXTENSION)?.last().copied())
}

/// Contents of the newest snapshot, if any
pub fn read_latest_snapshot(index_dir: &Path) -> Result<Option<(u64, Vec<u8>)>> {
    match latest_snapshot_id(index_dir)? {
        Some(id) => Ok(Some((id, fs::read(snapshot_path(index_dir, id))?))),
        None => Ok(None),
    }
}

/// Durably write a new snapshot generation, then remove all older ones.
///
/// The generation id is `now`, or the current latest id if the clock has not
/// moved past it; an equal id replaces the old file through the rename.
pub fn write_snapshot(index_dir: &Path, bytes: &[u8], now: u32) -> Result<u64> {
    fs::create_dir_all(index_dir)?;

    let id = latest_snapshot_id(index_dir)?.unwrap_or(0).max(now as u64);
    let final_path = snapshot_path(index_dir, id);
    let temp_path = index_dir.join(format!("{}.{}.{}", id, SNAPSHOT_EXTENSION, TEMP_EXTENSION));

    let mut file = File::create(&temp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&temp_path, &final_path)?;
    dir::sync_directory(index_dir)?;

    let removed = remove_stale(index_dir, id)?;
    debug!(
        snapshot_id = id,
        bytes = bytes.len(),
        removed,
        "wrote index snapshot"
    );

    Ok(id)
}

/// Remove every snapshot generation other than `keep`, plus leftover temp files
fn remove_stale(index_dir: &Path, keep: u64) -> Result<usize> {
    let mut removed = 0;

    for entry in fs::read_dir(index_dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }

        let stale = match dir::parse_file_id(&path, SNAPSHOT_EXTENSION) {
            Some(id) => id != keep,
            None => path.extension().is_some_and(|ext| ext == TEMP_EXTENSION),
        };

        if stale {
            fs::remove_file(&path)?;
            removed += 1;
        }
    }

    if removed > 0 {
        dir::sync_directory(index_dir)?;
    }
    Ok(removed)
}

//! Directory helpers.
//!
//! Segments and snapshots are both named `<id>.<extension>`; ids are the
//! leading dot-separated component of the file name, parsed as an integer.
//!
//! ```text
//! <root>/
//! ├─ data/
//! │  ├─ 1.data
//! │  └─ 2.data        # highest id = active segment
//! └─ index/
//!    └─ 1700000000.idx
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Build `<dir>/<id>.<extension>`
pub fn file_path(dir: &Path, id: u64, extension: &str) -> PathBuf {
    dir.join(format!("{}.{}", id, extension))
}

/// Parse the id from `<id>.<extension>`.
///
/// Returns `None` for files with another extension or a non-numeric id,
/// so temp files like `5.idx.tmp` are never mistaken for real ones.
pub fn parse_file_id(path: &Path, extension: &str) -> Option<u64> {
    if path.extension()? != extension {
        return None;
    }
    let name = path.file_name()?.to_str()?;
    name.split('.').next()?.parse().ok()
}

/// All ids in `dir` with the given extension, ascending
pub fn list_file_ids(dir: &Path, extension: &str) -> Result<Vec<u64>> {
    let mut ids = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        if path.is_file() {
            if let Some(id) = parse_file_id(&path, extension) {
                ids.push(id);
            }
        }
    }

    ids.sort_unstable();
    Ok(ids)
}

/// Fsync a directory so creates, renames and deletes inside it are durable.
#[cfg(unix)]
pub fn sync_directory(dir: &Path) -> Result<()> {
    fs::File::open(dir)?.sync_all()?;
    Ok(())
}

/// NTFS journals metadata; directory handles cannot be fsynced on Windows.
#[cfg(not(unix))]
pub fn sync_directory(_dir: &Path) -> Result<()> {
    Ok(())
}

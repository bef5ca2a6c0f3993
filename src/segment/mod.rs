//! Segment Module
//!
//! Append-only data files holding encoded items.
//!
//! ## Responsibilities
//! - Own the single active (writable) segment and its write cursor
//! - Rotate to a fresh segment once the size threshold is reached
//! - Cache one read handle per segment for point reads
//! - Scan segments sequentially for crash-recovery replay
//!
//! ## File Layout
//! ```text
//! data/<id>.data
//! ┌──────────┬──────────┬──────────┬─────┐
//! │ Item 1   │ Item 2   │ Item 3   │ ... │   (no header, no footer)
//! └──────────┴──────────┴──────────┴─────┘
//! ```

mod reader;
mod scanner;
mod store;

use std::fs;
use std::path::{Path, PathBuf};

use crate::dir;
use crate::error::Result;
use crate::types::SegmentId;

pub use reader::SegmentReader;
pub use scanner::{ScannedItem, SegmentScanner};
pub use store::{Appended, SegmentStore};

/// File extension of segment files
pub const SEGMENT_EXTENSION: &str = "data";

/// Path of segment `id` inside `data_dir`
pub fn segment_path(data_dir: &Path, id: SegmentId) -> PathBuf {
    dir::file_path(data_dir, id, SEGMENT_EXTENSION)
}

/// Ids of all segments in `data_dir`, ascending
pub fn list_segment_ids(data_dir: &Path) -> Result<Vec<SegmentId>> {
    dir::list_file_ids(data_dir, SEGMENT_EXTENSION)
}

/// Sum of the sizes of all segment files in `data_dir`
pub fn total_bytes_on_disk(data_dir: &Path) -> Result<u64> {
    let mut total = 0;
    for id in list_segment_ids(data_dir)? {
        total += fs::metadata(segment_path(data_dir, id))?.len();
    }
    Ok(total)
}

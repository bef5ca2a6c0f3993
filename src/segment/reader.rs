//! Segment Reader
//!
//! Positional reads from a segment file, shared across reader threads.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use parking_lot::Mutex;

use crate::error::{CaskError, Result};
use crate::types::SegmentId;

/// Read handle for one segment.
///
/// The file cursor is shared, so each read seeks under a short mutex; callers
/// only ever need `&self`.
#[derive(Debug)]
pub struct SegmentReader {
    id: SegmentId,
    file: Mutex<File>,
}

impl SegmentReader {
    /// Open a segment read-only
    pub fn open(path: &Path, id: SegmentId) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            id,
            file: Mutex::new(file),
        })
    }

    pub fn id(&self) -> SegmentId {
        self.id
    }

    /// Read exactly `len` bytes starting at `offset`
    pub fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        let mut file = self.file.lock();

        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buf).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => CaskError::Corruption(format!(
                "record at {}+{} extends past the end of segment {}",
                offset, len, self.id
            )),
            _ => CaskError::Io(e),
        })?;

        Ok(buf)
    }

    /// Current length of the segment file
    pub fn len(&self) -> Result<u64> {
        Ok(self.file.lock().metadata()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

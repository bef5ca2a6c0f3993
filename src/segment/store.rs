//! Segment Store
//!
//! Owns the active segment and the table of open read handles.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::config::SyncStrategy;
use crate::dir;
use crate::error::{CaskError, Result};
use crate::types::{Position, Record, SegmentId};

use super::{list_segment_ids, segment_path, SegmentReader};

/// Where an appended item landed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Appended {
    pub segment_id: SegmentId,
    pub offset: u32,
    pub size: u32,
}

/// The single writable segment
struct ActiveSegment {
    id: SegmentId,
    file: File,
    /// Write cursor (== file length)
    offset: u64,
    /// Appends since the last fsync
    unsynced: usize,
}

impl ActiveSegment {
    fn open(data_dir: &Path, id: SegmentId) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(segment_path(data_dir, id))?;
        let offset = file.metadata()?.len();

        Ok(Self {
            id,
            file,
            offset,
            unsynced: 0,
        })
    }

    fn sync(&mut self) -> Result<()> {
        if self.unsynced > 0 {
            self.file.sync_data()?;
            self.unsynced = 0;
        }
        Ok(())
    }
}

/// Manages the segments of one data directory
///
/// ## Concurrency:
/// - Mutating methods (`append`, rotation, cleanup) take `&mut self`; the
///   engine only calls them under its exclusive lock.
/// - `open_for_read` takes `&self` so shared-lock readers can open handles
///   lazily; the handle table has its own RwLock.
pub struct SegmentStore {
    /// Directory where segments are stored
    data_dir: PathBuf,

    /// Rotation threshold in bytes
    max_segment_size: u64,

    sync_strategy: SyncStrategy,

    active: ActiveSegment,

    /// Id for the next segment created
    next_id: SegmentId,

    /// Cached read handles, one per segment
    readers: RwLock<HashMap<SegmentId, Arc<SegmentReader>>>,
}

impl SegmentStore {
    /// Open the segments in `data_dir`, choosing the active segment.
    ///
    /// - No segments: segment 1 is created.
    /// - Newest segment below the threshold: it is reopened for appends with
    ///   the cursor at its end.
    /// - Newest segment full: a fresh segment is created after it.
    pub fn open(data_dir: &Path, max_segment_size: u64, sync_strategy: SyncStrategy) -> Result<Self> {
        fs::create_dir_all(data_dir)?;

        let ids = list_segment_ids(data_dir)?;

        let active_id = match ids.last() {
            None => 1,
            Some(&latest) => {
                let len = fs::metadata(segment_path(data_dir, latest))?.len();
                if len >= max_segment_size {
                    latest + 1
                } else {
                    latest
                }
            }
        };

        let active = ActiveSegment::open(data_dir, active_id)?;
        if ids.last() != Some(&active_id) {
            dir::sync_directory(data_dir)?;
            debug!(segment_id = active_id, "created active segment");
        }

        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            max_segment_size,
            sync_strategy,
            active,
            next_id: active_id + 1,
            readers: RwLock::new(HashMap::new()),
        })
    }

    /// Seal the active segment and start a new one.
    ///
    /// The sealed segment stays readable through `open_for_read`.
    pub fn create_active_segment(&mut self) -> Result<SegmentId> {
        self.active.file.sync_data()?;
        self.active.unsynced = 0;

        let id = self.next_id;
        let active = ActiveSegment::open(&self.data_dir, id)?;
        dir::sync_directory(&self.data_dir)?;

        let sealed = std::mem::replace(&mut self.active, active);
        self.next_id = id + 1;

        debug!(
            sealed = sealed.id,
            sealed_bytes = sealed.offset,
            active = id,
            "rotated segment"
        );
        Ok(id)
    }

    /// Rotate when the active segment has reached the threshold
    pub fn rotate_if_full(&mut self) -> Result<bool> {
        if self.active.offset < self.max_segment_size {
            return Ok(false);
        }
        self.create_active_segment()?;
        Ok(true)
    }

    /// Append an encoded item to the active segment
    pub fn append(&mut self, bytes: &[u8]) -> Result<Appended> {
        let start = self.active.offset;
        let end = start + bytes.len() as u64;

        if end > u32::MAX as u64 {
            return Err(CaskError::InvalidArgument(format!(
                "record of {} bytes does not fit in segment {} at offset {}",
                bytes.len(),
                self.active.id,
                start
            )));
        }

        if let Err(e) = self.active.file.write_all(bytes) {
            // Drop the partial item so later appends stay contiguous.
            if let Err(trunc) = self.active.file.set_len(start) {
                warn!(
                    segment_id = self.active.id,
                    error = %trunc,
                    "could not roll back partial append"
                );
            }
            return Err(e.into());
        }

        self.active.offset = end;
        self.active.unsynced += 1;

        let due = match self.sync_strategy {
            SyncStrategy::EveryWrite => true,
            SyncStrategy::EveryNEntries { count } => self.active.unsynced >= count,
        };
        if due {
            self.active.sync()?;
        }

        Ok(Appended {
            segment_id: self.active.id,
            offset: start as u32,
            size: bytes.len() as u32,
        })
    }

    /// Read handle for a segment, opened on first use and cached
    pub fn open_for_read(&self, id: SegmentId) -> Result<Arc<SegmentReader>> {
        if let Some(reader) = self.readers.read().get(&id) {
            return Ok(Arc::clone(reader));
        }

        let mut readers = self.readers.write();
        if let Some(reader) = readers.get(&id) {
            return Ok(Arc::clone(reader));
        }

        let path = segment_path(&self.data_dir, id);
        if !path.exists() {
            return Err(CaskError::Corruption(format!(
                "segment {} is referenced but missing from {}",
                id,
                self.data_dir.display()
            )));
        }

        let reader = Arc::new(SegmentReader::open(&path, id)?);
        readers.insert(id, Arc::clone(&reader));
        Ok(reader)
    }

    /// Read the encoded item a record points at
    pub fn read(&self, record: &Record) -> Result<Vec<u8>> {
        self.open_for_read(record.segment_id)?
            .read_at(record.offset as u64, record.size as usize)
    }

    /// Force the active segment to disk
    pub fn sync(&mut self) -> Result<()> {
        self.active.sync()
    }

    /// Drop every cached read handle
    pub fn close_readers(&self) {
        self.readers.write().clear();
    }

    /// Delete every segment older than `first_kept`.
    ///
    /// Returns the ids that were removed.
    pub fn remove_segments_before(&mut self, first_kept: SegmentId) -> Result<Vec<SegmentId>> {
        let stale: Vec<SegmentId> = list_segment_ids(&self.data_dir)?
            .into_iter()
            .filter(|&id| id < first_kept && id != self.active.id)
            .collect();

        {
            let mut readers = self.readers.write();
            for id in &stale {
                readers.remove(id);
            }
        }

        for &id in &stale {
            fs::remove_file(segment_path(&self.data_dir, id))?;
        }
        if !stale.is_empty() {
            dir::sync_directory(&self.data_dir)?;
        }

        Ok(stale)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn active_id(&self) -> SegmentId {
        self.active.id
    }

    /// Current write cursor of the active segment
    pub fn active_offset(&self) -> u64 {
        self.active.offset
    }

    /// Position the next append will land at
    pub fn checkpoint(&self) -> Position {
        Position {
            segment_id: self.active.id,
            offset: self.active.offset,
        }
    }

    pub fn max_segment_size(&self) -> u64 {
        self.max_segment_size
    }

    /// Ids of all segment files currently on disk
    pub fn segment_ids(&self) -> Result<Vec<SegmentId>> {
        list_segment_ids(&self.data_dir)
    }

    pub fn segment_count(&self) -> Result<usize> {
        Ok(self.segment_ids()?.len())
    }

    pub fn total_bytes_on_disk(&self) -> Result<u64> {
        super::total_bytes_on_disk(&self.data_dir)
    }

    /// Number of cached read handles
    pub fn open_reader_count(&self) -> usize {
        self.readers.read().len()
    }
}

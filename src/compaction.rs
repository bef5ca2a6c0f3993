//! Compaction
//!
//! Rewrites live records into fresh segments and deletes everything older.
//!
//! ## Pass
//! 1. Seal the active segment; every segment created from here on is kept
//! 2. Copy each unexpired record into the new segments (normal rotation)
//! 3. Sync, then point the index at the copies and drop expired entries
//! 4. Write a snapshot of the new index
//! 5. Delete all segments older than the first new one
//!
//! Old segments are only deleted after step 4 succeeds, so a failed pass
//! leaves them authoritative.

use std::path::Path;

use tracing::info;

use crate::codec::{decode_record, encode_record};
use crate::error::{CaskError, Result};
use crate::index::{write_snapshot, Index};
use crate::segment::SegmentStore;
use crate::types::{unix_now, Fingerprint, Record};

/// What a compaction pass did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CompactionStats {
    /// Records copied into new segments
    pub records_rewritten: u64,
    /// Expired records dropped from the index
    pub records_expired: u64,
    /// Segments deleted
    pub segments_removed: u64,
    /// Segment bytes on disk before the pass
    pub bytes_before: u64,
    /// Segment bytes on disk after the pass
    pub bytes_after: u64,
    /// Snapshot generation written at the end of the pass
    pub snapshot_id: u64,
}

/// Runs a compaction pass over an index and its segments
pub struct Compactor<'a> {
    index: &'a mut Index,
    segments: &'a mut SegmentStore,
    index_dir: &'a Path,
}

impl<'a> Compactor<'a> {
    /// The caller must hold exclusive access to both for the whole pass
    pub fn new(index: &'a mut Index, segments: &'a mut SegmentStore, index_dir: &'a Path) -> Self {
        Self {
            index,
            segments,
            index_dir,
        }
    }

    pub fn run(mut self) -> Result<CompactionStats> {
        let now = unix_now();
        let mut stats = CompactionStats {
            bytes_before: self.segments.total_bytes_on_disk()?,
            ..CompactionStats::default()
        };

        let first_new = self.segments.create_active_segment()?;

        let mut expired: Vec<Fingerprint> = Vec::new();
        let mut live: Vec<(Fingerprint, Record)> = Vec::with_capacity(self.index.len());
        for (fingerprint, record) in self.index.iter() {
            if record.is_expired(now) {
                expired.push(fingerprint);
            } else {
                live.push((fingerprint, record));
            }
        }

        let mut relocated = Vec::with_capacity(live.len());
        for (fingerprint, record) in live {
            relocated.push((fingerprint, self.rewrite(&record)?));
        }
        self.segments.sync()?;

        for fingerprint in expired {
            self.index.delete(fingerprint);
            stats.records_expired += 1;
        }
        for (fingerprint, record) in relocated {
            self.index.put(fingerprint, record);
            stats.records_rewritten += 1;
        }

        let snapshot = self.index.dump_snapshot(self.segments.checkpoint(), now);
        stats.snapshot_id = write_snapshot(self.index_dir, &snapshot, now)?;

        stats.segments_removed = self.segments.remove_segments_before(first_new)?.len() as u64;
        stats.bytes_after = self.segments.total_bytes_on_disk()?;

        info!(
            rewritten = stats.records_rewritten,
            expired = stats.records_expired,
            segments_removed = stats.segments_removed,
            bytes_before = stats.bytes_before,
            bytes_after = stats.bytes_after,
            "compaction finished"
        );

        Ok(stats)
    }

    /// Copy one record into the active segment, returning its new locator
    fn rewrite(&mut self, record: &Record) -> Result<Record> {
        let bytes = self.segments.read(record)?;
        let item = decode_record(&bytes)?;

        let value = item.value.as_deref().ok_or_else(|| {
            CaskError::Corruption(format!(
                "index points at a tombstone in segment {} offset {}",
                record.segment_id, record.offset
            ))
        })?;

        let encoded = encode_record(item.timestamp, &item.key, Some(value))?;
        self.segments.rotate_if_full()?;
        let appended = self.segments.append(&encoded)?;

        Ok(Record {
            segment_id: appended.segment_id,
            size: appended.size,
            offset: appended.offset,
            ..*record
        })
    }
}

//! Recovery
//!
//! Rebuilds engine state from a root directory on startup.
//!
//! ## Startup Sequence
//! 1. Root missing → create `data/` + `index/`, start segment 1, done
//! 2. Sum segment sizes → refuse to open at or above `max_total_size`
//! 3. Load the newest snapshot into the index
//! 4. Replay every item written after the snapshot's checkpoint, taking
//!    expiries from the expiry journal
//! 5. Pick the active segment (reopen newest, or start a new one if full);
//!    after a torn-tail truncation, snapshot the recovered index
//! 6. Open read handles for every segment the index references
//!
//! Any failure aborts `open`; no half-built engine is ever returned.

use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::path::Path;

use tracing::{info, warn};

use crate::config::Config;
use crate::error::{CaskError, Result};
use crate::hash::KeyHasher;
use crate::index::{
    read_expiry_journal, read_latest_snapshot, write_snapshot, ExpiryJournal, ExpiryMap, Index,
};
use crate::segment::{self, segment_path, ScannedItem, SegmentScanner, SegmentStore};
use crate::types::{unix_now, Position, Record, SegmentId};

/// Result of a recovery operation
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryResult {
    /// The root did not exist and was created empty
    pub fresh: bool,

    /// Snapshot generation the index was loaded from
    pub snapshot_id: Option<u64>,

    /// Snapshot entries inserted into the index
    pub entries_loaded: u64,

    /// Snapshot entries dropped as expired
    pub entries_expired: u64,

    /// Segments scanned past the checkpoint
    pub segments_replayed: u64,

    /// Items re-applied from segments
    pub records_replayed: u64,

    /// Tombstones re-applied from segments
    pub tombstones_replayed: u64,

    /// Replayed items whose journaled expiry had already passed
    pub expired_replayed: u64,

    /// Whether a torn tail was cut off the newest segment
    pub was_truncated: bool,

    /// Segment accepting writes after recovery
    pub active_segment: SegmentId,
}

/// State rebuilt by recovery, handed to the engine
pub struct Recovered {
    pub index: Index,
    pub segments: SegmentStore,
    pub journal: ExpiryJournal,
    pub result: RecoveryResult,
}

/// Handles engine recovery on startup
pub struct RecoveryManager<'a> {
    config: &'a Config,
    hasher: &'a dyn KeyHasher,
}

impl<'a> RecoveryManager<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            hasher: config.hasher.as_ref(),
        }
    }

    /// Open the configured root, creating it when missing
    pub fn recover(&self) -> Result<Recovered> {
        let data_dir = self.config.data_path();
        let index_dir = self.config.index_path();
        let fresh = !self.config.root_dir.exists();

        // Also repairs a root missing one of its subdirectories.
        fs::create_dir_all(&data_dir)?;
        fs::create_dir_all(&index_dir)?;

        if fresh {
            let segments = self.open_segments(&data_dir)?;
            let journal = ExpiryJournal::open(&index_dir, self.config.sync_strategy)?;
            info!(
                root = %self.config.root_dir.display(),
                active_segment = segments.active_id(),
                "created new store"
            );
            let result = RecoveryResult {
                fresh: true,
                active_segment: segments.active_id(),
                ..RecoveryResult::default()
            };
            return Ok(Recovered {
                index: Index::new(),
                segments,
                journal,
                result,
            });
        }

        let total = segment::total_bytes_on_disk(&data_dir)?;
        let limit = self.config.total_size_limit();
        if total >= limit {
            return Err(CaskError::Capacity { total, limit });
        }

        let mut index = Index::new();
        let mut result = RecoveryResult::default();

        let checkpoint = match read_latest_snapshot(&index_dir)? {
            Some((id, bytes)) => {
                let load = index.load_snapshot(&bytes, unix_now()).map_err(|e| {
                    CaskError::Recovery(format!("snapshot {} is unreadable: {}", id, e))
                })?;
                result.snapshot_id = Some(id);
                result.entries_loaded = load.loaded;
                result.entries_expired = load.expired;
                load.high_water.unwrap_or_default()
            }
            None => Position::default(),
        };

        let expiries = read_expiry_journal(&index_dir)
            .map_err(|e| CaskError::Recovery(format!("expiry journal is unreadable: {}", e)))?;

        let now = unix_now();
        self.replay(&data_dir, checkpoint, &expiries, now, &mut index, &mut result)?;

        let segments = self.open_segments(&data_dir)?;
        let mut journal = ExpiryJournal::open(&index_dir, self.config.sync_strategy)?;
        result.active_segment = segments.active_id();

        // Journal entries past the cut would match later writes to the same offsets.
        if result.was_truncated {
            let snapshot = index.dump_snapshot(segments.checkpoint(), now);
            write_snapshot(&index_dir, &snapshot, now)?;
            journal.reset()?;
        }

        let referenced: BTreeSet<SegmentId> =
            index.iter().map(|(_, record)| record.segment_id).collect();
        for id in referenced {
            segments.open_for_read(id).map_err(|e| {
                CaskError::Recovery(format!("cannot open segment {}: {}", id, e))
            })?;
        }

        info!(
            root = %self.config.root_dir.display(),
            snapshot = ?result.snapshot_id,
            keys = index.len(),
            loaded = result.entries_loaded,
            expired = result.entries_expired,
            replayed = result.records_replayed,
            tombstones = result.tombstones_replayed,
            expired_on_replay = result.expired_replayed,
            truncated = result.was_truncated,
            active_segment = result.active_segment,
            "recovered store"
        );

        Ok(Recovered {
            index,
            segments,
            journal,
            result,
        })
    }

    fn open_segments(&self, data_dir: &Path) -> Result<SegmentStore> {
        SegmentStore::open(
            data_dir,
            self.config.segment_size_limit(),
            self.config.sync_strategy,
        )
    }

    /// Re-apply every item at or after `checkpoint`, in log order.
    ///
    /// A torn tail on the newest segment is cut off. Damage anywhere else,
    /// including a bad item in the newest segment with data after it, aborts
    /// recovery and leaves the files untouched.
    fn replay(
        &self,
        data_dir: &Path,
        checkpoint: Position,
        expiries: &ExpiryMap,
        now: u32,
        index: &mut Index,
        result: &mut RecoveryResult,
    ) -> Result<()> {
        let ids = segment::list_segment_ids(data_dir)?;
        let newest = ids.last().copied();

        for id in ids.into_iter().filter(|&id| id >= checkpoint.segment_id) {
            let from = if id == checkpoint.segment_id {
                checkpoint.offset
            } else {
                0
            };

            let path = segment_path(data_dir, id);
            let mut scanner = SegmentScanner::open(&path, id, from).map_err(|e| {
                CaskError::Recovery(format!("cannot replay segment {}: {}", id, e))
            })?;
            if scanner.position() == scanner.file_len() {
                continue;
            }
            result.segments_replayed += 1;

            while let Some(scanned) = scanner.next() {
                match scanned {
                    Ok(scanned) => self.apply(id, scanned, expiries, now, index, result)?,
                    Err(CaskError::Corruption(reason))
                        if Some(id) == newest && scanner.is_torn() =>
                    {
                        warn!(segment_id = id, %reason, "discarding torn segment tail");
                    }
                    Err(e) => {
                        return Err(CaskError::Recovery(format!(
                            "replay of segment {} failed at offset {}: {}",
                            id,
                            scanner.position(),
                            e
                        )))
                    }
                }
            }

            if scanner.stopped_early() {
                let valid_len = scanner.position();
                let file = OpenOptions::new().write(true).open(&path)?;
                file.set_len(valid_len)?;
                file.sync_all()?;
                warn!(
                    segment_id = id,
                    kept = valid_len,
                    dropped = scanner.file_len() - valid_len,
                    "truncated segment"
                );
                result.was_truncated = true;
            }
        }

        Ok(())
    }

    fn apply(
        &self,
        segment_id: SegmentId,
        scanned: ScannedItem,
        expiries: &ExpiryMap,
        now: u32,
        index: &mut Index,
        result: &mut RecoveryResult,
    ) -> Result<()> {
        let fingerprint = self.hasher.fingerprint(&scanned.item.key);

        if scanned.item.is_tombstone() {
            index.delete(fingerprint);
            result.tombstones_replayed += 1;
            return Ok(());
        }

        let offset = u32::try_from(scanned.offset).map_err(|_| {
            CaskError::Recovery(format!(
                "item at offset {} in segment {} is not addressable",
                scanned.offset, segment_id
            ))
        })?;

        let record = Record {
            segment_id,
            size: scanned.size,
            offset,
            timestamp: u32::try_from(scanned.item.timestamp).unwrap_or(u32::MAX),
            expire_time: expiries
                .lookup(segment_id, offset, fingerprint)
                .unwrap_or(0),
        };
        result.records_replayed += 1;

        // The newest write for the key has lapsed; the key is gone.
        if record.is_expired(now) {
            index.delete(fingerprint);
            result.expired_replayed += 1;
        } else {
            index.put(fingerprint, record);
        }
        Ok(())
    }
}

//! Engine Module
//!
//! The storage engine that coordinates all components.
//!
//! ## Responsibilities
//! - Route puts/deletes through the codec into the active segment
//! - Serve point reads from the index and segment read handles
//! - Run recovery on open and snapshot the index on close
//! - Run compaction on request

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::codec::{decode_record, encode_record, Item};
use crate::compaction::{CompactionStats, Compactor};
use crate::config::Config;
use crate::crypto::ValueCipher;
use crate::error::{CaskError, Result};
use crate::hash::KeyHasher;
use crate::index::{write_snapshot, ExpiryJournal, Index};
use crate::recovery::{RecoveryManager, RecoveryResult};
use crate::segment::SegmentStore;
use crate::types::{to_unix_secs, unix_now, Record, SegmentId};

/// State guarded by the engine lock
struct EngineState {
    index: Index,
    segments: SegmentStore,
    /// Expiries of writes made since the last snapshot
    journal: ExpiryJournal,
}

impl EngineState {
    /// Read the item a record points at and check it belongs to `key`
    fn verified_item(&self, record: &Record, key: &[u8]) -> Result<Item> {
        let bytes = self.segments.read(record)?;
        let item = decode_record(&bytes)?;
        if item.key != key {
            return Err(CaskError::KeyMismatch);
        }
        Ok(item)
    }

    /// Write a snapshot of the index, then empty the expiry journal it supersedes
    fn snapshot(&mut self, index_dir: &Path) -> Result<u64> {
        let now = unix_now();
        let snapshot = self.index.dump_snapshot(self.segments.checkpoint(), now);
        let snapshot_id = write_snapshot(index_dir, &snapshot, now)?;
        self.journal.reset()?;
        Ok(snapshot_id)
    }
}

/// The main storage engine
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// One `RwLock` guards the index and the segment store together.
///
/// - **Writes** (put/delete/compact/sync/close): exclusive lock for the
///   whole encode → append → index update, including any rotation.
///   Only ONE write operation at a time.
///
/// - **Reads** (get/contains): shared lock for lookup + read + decode.
///   Readers run concurrently with each other, never with a write.
///   Segment read handles use an internal Mutex for seeking, so they are
///   shared through `&self`.
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Index + segments
    state: RwLock<EngineState>,

    /// Key fingerprint function
    hasher: Arc<dyn KeyHasher>,

    /// Present when value encryption is enabled
    cipher: Option<ValueCipher>,

    /// What startup recovery did
    recovery: RecoveryResult,
}

impl Engine {
    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Validate the config (before touching the filesystem)
    /// 2. Create the root if it doesn't exist, otherwise recover
    /// 3. Ready to serve requests
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let cipher = config.value_cipher()?;
        let hasher = Arc::clone(&config.hasher);

        let recovered = RecoveryManager::new(&config).recover()?;

        info!(
            root = %config.root_dir.display(),
            keys = recovered.index.len(),
            encryption = cipher.is_some(),
            "engine opened"
        );

        Ok(Self {
            config,
            state: RwLock::new(EngineState {
                index: recovered.index,
                segments: recovered.segments,
                journal: recovered.journal,
            }),
            hasher,
            cipher,
            recovery: recovered.result,
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified root directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().root_dir(path).build())
    }

    /// Get the value for a key
    ///
    /// Errors:
    /// - `KeyNotFound`: no value for this key
    /// - `KeyExpired`: the value's expiry has passed
    /// - `Corruption`: the stored record failed its checksum
    /// - `KeyMismatch`: the index slot belongs to a colliding key
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let fingerprint = self.hasher.fingerprint(key);

        let state = self.state.read();

        let record = state
            .index
            .get(fingerprint)
            .ok_or(CaskError::KeyNotFound)?;
        if record.is_expired(unix_now()) {
            return Err(CaskError::KeyExpired);
        }

        let item = state.verified_item(&record, key)?;
        drop(state);

        let value = item.value.ok_or_else(|| {
            CaskError::Corruption(format!(
                "index points at a tombstone in segment {} offset {}",
                record.segment_id, record.offset
            ))
        })?;

        match &self.cipher {
            Some(cipher) => cipher.open(&value),
            None => Ok(value),
        }
    }

    /// Whether `get` would find a live value for the key.
    ///
    /// The stored key is verified, so a colliding key reports `false`.
    /// The value is not decrypted.
    pub fn contains(&self, key: &[u8]) -> Result<bool> {
        let fingerprint = self.hasher.fingerprint(key);
        let state = self.state.read();

        let record = match state.index.get(fingerprint) {
            Some(record) if !record.is_expired(unix_now()) => record,
            _ => return Ok(false),
        };

        match state.verified_item(&record, key) {
            Ok(_) => Ok(true),
            Err(CaskError::KeyMismatch) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Put a key-value pair that never expires
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.put_record(key, value, 0)
    }

    /// Put a key-value pair that expires `ttl` from now
    pub fn put_with_ttl(&self, key: &[u8], value: &[u8], ttl: Duration) -> Result<()> {
        let expire_at = SystemTime::now()
            .checked_add(ttl)
            .ok_or_else(|| CaskError::InvalidArgument(format!("ttl {:?} overflows", ttl)))?;
        self.put_with_expiry(key, value, expire_at)
    }

    /// Put a key-value pair that expires at `expire_at`
    ///
    /// Times at or before the epoch count as already expired.
    pub fn put_with_expiry(&self, key: &[u8], value: &[u8], expire_at: SystemTime) -> Result<()> {
        // 0 is reserved for "never expires"
        let expire_time = to_unix_secs(expire_at).max(1);
        self.put_record(key, value, expire_time)
    }

    /// Steps:
    /// 1. Encrypt the value (if enabled)
    /// 2. Acquire write lock
    /// 3. Rotate the active segment if full
    /// 4. Journal the expiry (if any) at the position about to be written
    /// 5. Encode + append
    /// 6. Point the index at the new record
    fn put_record(&self, key: &[u8], value: &[u8], expire_time: u32) -> Result<()> {
        let fingerprint = self.hasher.fingerprint(key);

        let sealed;
        let stored = match &self.cipher {
            Some(cipher) => {
                sealed = cipher.seal(value)?;
                sealed.as_slice()
            }
            None => value,
        };

        let mut state = self.state.write();

        let now = unix_now();
        let bytes = encode_record(now as u64, key, Some(stored))?;

        state.segments.rotate_if_full()?;

        if expire_time != 0 {
            let position = state.segments.checkpoint();
            let offset = u32::try_from(position.offset).map_err(|_| {
                CaskError::InvalidArgument(format!(
                    "segment {} is full at offset {}",
                    position.segment_id, position.offset
                ))
            })?;
            state
                .journal
                .append(position.segment_id, offset, fingerprint, expire_time)?;
        }

        let appended = state.segments.append(&bytes)?;

        state.index.put(
            fingerprint,
            Record {
                segment_id: appended.segment_id,
                size: appended.size,
                offset: appended.offset,
                timestamp: now,
                expire_time,
            },
        );

        Ok(())
    }

    /// Delete a key
    ///
    /// Appends a tombstone so replay after a crash agrees with the index,
    /// then drops the index entry. Deleting a missing key is a no-op.
    ///
    /// Fails with `KeyMismatch`, leaving everything untouched, when the index
    /// slot belongs to a different key with the same fingerprint.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        let fingerprint = self.hasher.fingerprint(key);

        let mut state = self.state.write();

        let record = match state.index.get(fingerprint) {
            Some(record) => record,
            None => return Ok(()),
        };
        state.verified_item(&record, key)?;

        let bytes = encode_record(unix_now() as u64, key, None)?;
        state.segments.rotate_if_full()?;
        state.segments.append(&bytes)?;

        state.index.delete(fingerprint);
        Ok(())
    }

    /// Rewrite live records into fresh segments and delete the old ones
    pub fn compact(&self) -> Result<CompactionStats> {
        let mut state = self.state.write();
        let EngineState {
            index,
            segments,
            journal,
        } = &mut *state;

        let index_dir = self.config.index_path();
        let stats = Compactor::new(index, segments, &index_dir).run()?;

        // The compaction snapshot carries every expiry.
        journal.reset()?;
        Ok(stats)
    }

    /// Force the active segment and the expiry journal to disk
    pub fn sync(&self) -> Result<()> {
        let mut state = self.state.write();
        state.journal.sync()?;
        state.segments.sync()
    }

    /// Close the engine gracefully
    ///
    /// Syncs the active segment, writes an index snapshot, removes the older
    /// ones and empties the expiry journal. The exclusive lock is held for
    /// the whole sequence.
    pub fn close(self) -> Result<()> {
        let mut state = self.state.write();

        state.segments.sync()?;
        let snapshot_id = state.snapshot(&self.config.index_path())?;

        state.segments.close_readers();

        debug!(snapshot_id, keys = state.index.len(), "engine closed");
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the root directory path
    pub fn root_dir(&self) -> &Path {
        &self.config.root_dir
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// What startup recovery did
    pub fn recovery_result(&self) -> &RecoveryResult {
        &self.recovery
    }

    /// Number of indexed keys (expired ones included until compaction)
    pub fn len(&self) -> usize {
        self.state.read().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().index.is_empty()
    }

    /// Segment accepting writes
    pub fn active_segment_id(&self) -> SegmentId {
        self.state.read().segments.active_id()
    }

    /// Number of segment files on disk
    pub fn segment_count(&self) -> Result<usize> {
        self.state.read().segments.segment_count()
    }

    /// Total segment bytes on disk
    pub fn total_bytes_on_disk(&self) -> Result<u64> {
        self.state.read().segments.total_bytes_on_disk()
    }
}

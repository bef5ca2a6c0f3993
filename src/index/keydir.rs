//! In-memory index
//!
//! HashMap from key fingerprint to record locator. Holds no key bytes; the
//! engine re-checks the stored key on every read to catch collisions.

use std::collections::HashMap;

use crate::codec::{decode_index_entry, encode_index_entry, INDEX_ENTRY_SIZE};
use crate::error::{CaskError, Result};
use crate::types::{Fingerprint, Position, Record};

/// Expiry written into the checkpoint entry; any past time works, 0 would
/// mean "never expires".
const CHECKPOINT_EXPIRY: u32 = 1;

/// What a snapshot load did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotLoad {
    /// Entries inserted into the index
    pub loaded: u64,
    /// Entries dropped because they had already expired (checkpoint included)
    pub expired: u64,
    /// Furthest log position covered by the snapshot
    pub high_water: Option<Position>,
}

/// Fingerprint → locator map
#[derive(Debug, Default)]
pub struct Index {
    entries: HashMap<Fingerprint, Record>,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite, returning the previous locator
    pub fn put(&mut self, fingerprint: Fingerprint, record: Record) -> Option<Record> {
        self.entries.insert(fingerprint, record)
    }

    pub fn get(&self, fingerprint: Fingerprint) -> Option<Record> {
        self.entries.get(&fingerprint).copied()
    }

    pub fn delete(&mut self, fingerprint: Fingerprint) -> Option<Record> {
        self.entries.remove(&fingerprint)
    }

    pub fn contains(&self, fingerprint: Fingerprint) -> bool {
        self.entries.contains_key(&fingerprint)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries, in no particular order
    pub fn iter(&self) -> impl Iterator<Item = (Fingerprint, Record)> + '_ {
        self.entries.iter().map(|(&fp, &record)| (fp, record))
    }

    /// Load a whole snapshot.
    ///
    /// Entries already expired at `now` are skipped. Nothing is inserted
    /// unless every entry decodes.
    pub fn load_snapshot(&mut self, bytes: &[u8], now: u32) -> Result<SnapshotLoad> {
        if bytes.len() % INDEX_ENTRY_SIZE != 0 {
            return Err(CaskError::Corruption(format!(
                "snapshot length {} is not a multiple of {}",
                bytes.len(),
                INDEX_ENTRY_SIZE
            )));
        }

        let decoded = bytes
            .chunks_exact(INDEX_ENTRY_SIZE)
            .map(decode_index_entry)
            .collect::<Result<Vec<_>>>()?;

        let mut load = SnapshotLoad::default();
        for (fingerprint, record) in decoded {
            load.high_water = load.high_water.max(Some(record.end()));

            if record.is_expired(now) {
                load.expired += 1;
            } else {
                self.entries.insert(fingerprint, record);
                load.loaded += 1;
            }
        }

        Ok(load)
    }

    /// Serialize every unexpired entry followed by a checkpoint at `checkpoint`
    pub fn dump_snapshot(&self, checkpoint: Position, now: u32) -> Vec<u8> {
        let mut buf = Vec::with_capacity((self.entries.len() + 1) * INDEX_ENTRY_SIZE);

        for (&fingerprint, record) in &self.entries {
            if !record.is_expired(now) {
                buf.extend_from_slice(&encode_index_entry(fingerprint, record));
            }
        }

        let marker = Record {
            segment_id: checkpoint.segment_id,
            size: 0,
            offset: u32::try_from(checkpoint.offset).unwrap_or(u32::MAX),
            timestamp: now,
            expire_time: CHECKPOINT_EXPIRY,
        };
        buf.extend_from_slice(&encode_index_entry(0, &marker));

        buf
    }
}

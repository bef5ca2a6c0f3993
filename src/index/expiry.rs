//! Expiry journal
//!
//! Expiry times live only in the index, so a snapshot is the only durable
//! copy of them. Writes made after the last snapshot are recovered by replay,
//! which sees the record but not its expiry. The journal closes that gap: every
//! put with an expiry first appends the position it is about to occupy, and
//! replay looks positions up here.
//!
//! ## Entry Format (little-endian, 28 bytes)
//! ```text
//! ┌─────────┬────────────────┬────────────┬─────────────────┬─────────────┐
//! │ CRC (4) │ SegmentId (8)  │ Offset (4) │ Fingerprint (8) │ Expires (4) │
//! └─────────┴────────────────┴────────────┴─────────────────┴─────────────┘
//! ```
//!
//! The journal is emptied each time a snapshot is written, since the snapshot
//! then carries every expiry up to its checkpoint.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use bytes::{Buf, BufMut};
use tracing::{debug, warn};

use crate::config::SyncStrategy;
use crate::error::{CaskError, Result};
use crate::types::{Fingerprint, SegmentId};

/// File name of the journal inside the index directory
pub const EXPIRY_JOURNAL_FILE: &str = "expiry.journal";

/// Fixed size of one journal entry
pub const EXPIRY_ENTRY_SIZE: usize = 28;

/// Expiries recorded for positions written after the last snapshot
#[derive(Debug, Default)]
pub struct ExpiryMap {
    entries: HashMap<(SegmentId, u32), (Fingerprint, u32)>,
}

impl ExpiryMap {
    /// Expiry recorded for the item at `segment_id`/`offset`, if it belongs
    /// to `fingerprint`
    pub fn lookup(&self, segment_id: SegmentId, offset: u32, fingerprint: Fingerprint) -> Option<u32> {
        match self.entries.get(&(segment_id, offset)) {
            Some(&(fp, expire_time)) if fp == fingerprint => Some(expire_time),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Path of the journal inside `index_dir`
pub fn expiry_journal_path(index_dir: &Path) -> PathBuf {
    index_dir.join(EXPIRY_JOURNAL_FILE)
}

fn encode_entry(
    segment_id: SegmentId,
    offset: u32,
    fingerprint: Fingerprint,
    expire_time: u32,
) -> [u8; EXPIRY_ENTRY_SIZE] {
    let mut buf = [0u8; EXPIRY_ENTRY_SIZE];
    {
        let mut body = &mut buf[4..];
        body.put_u64_le(segment_id);
        body.put_u32_le(offset);
        body.put_u64_le(fingerprint);
        body.put_u32_le(expire_time);
    }

    let crc = crc32fast::hash(&buf[4..]);
    buf[0..4].copy_from_slice(&crc.to_le_bytes());
    buf
}

/// Read the journal in `index_dir`.
///
/// A missing journal is empty. A partial or damaged final entry is an
/// interrupted append and is ignored; damage before the last entry is
/// `Corruption`.
pub fn read_expiry_journal(index_dir: &Path) -> Result<ExpiryMap> {
    let bytes = match fs::read(expiry_journal_path(index_dir)) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(ExpiryMap::default()),
        Err(e) => return Err(e.into()),
    };

    let mut map = ExpiryMap::default();
    let chunks: Vec<&[u8]> = bytes.chunks_exact(EXPIRY_ENTRY_SIZE).collect();
    let last = chunks.len().saturating_sub(1);

    for (i, chunk) in chunks.into_iter().enumerate() {
        let mut cursor = chunk;
        let stored_crc = cursor.get_u32_le();
        if stored_crc != crc32fast::hash(&chunk[4..]) {
            if i == last && bytes.len() % EXPIRY_ENTRY_SIZE == 0 {
                warn!(entry = i, "ignoring torn expiry journal entry");
                break;
            }
            return Err(CaskError::Corruption(format!(
                "expiry journal entry {} checksum mismatch",
                i
            )));
        }

        let segment_id = cursor.get_u64_le();
        let offset = cursor.get_u32_le();
        let fingerprint = cursor.get_u64_le();
        let expire_time = cursor.get_u32_le();
        map.entries
            .insert((segment_id, offset), (fingerprint, expire_time));
    }

    if bytes.len() % EXPIRY_ENTRY_SIZE != 0 {
        warn!(
            bytes = bytes.len() % EXPIRY_ENTRY_SIZE,
            "ignoring partial expiry journal entry"
        );
    }

    Ok(map)
}

/// Append handle on the journal
#[derive(Debug)]
pub struct ExpiryJournal {
    path: PathBuf,
    file: File,
    sync_strategy: SyncStrategy,
    /// Appends since the last fsync
    unsynced: usize,
}

impl ExpiryJournal {
    /// Open (or create) the journal in `index_dir` for appending.
    ///
    /// A partial trailing entry is cut off so new entries stay aligned.
    pub fn open(index_dir: &Path, sync_strategy: SyncStrategy) -> Result<Self> {
        let path = expiry_journal_path(index_dir);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        let len = file.metadata()?.len();
        let aligned = len - len % EXPIRY_ENTRY_SIZE as u64;
        if aligned != len {
            file.set_len(aligned)?;
            file.sync_all()?;
        }

        Ok(Self {
            path,
            file,
            sync_strategy,
            unsynced: 0,
        })
    }

    /// Record that the item about to be written at `segment_id`/`offset`
    /// expires at `expire_time`
    pub fn append(
        &mut self,
        segment_id: SegmentId,
        offset: u32,
        fingerprint: Fingerprint,
        expire_time: u32,
    ) -> Result<()> {
        self.file
            .write_all(&encode_entry(segment_id, offset, fingerprint, expire_time))?;
        self.unsynced += 1;

        let due = match self.sync_strategy {
            SyncStrategy::EveryWrite => true,
            SyncStrategy::EveryNEntries { count } => self.unsynced >= count,
        };
        if due {
            self.sync()?;
        }
        Ok(())
    }

    pub fn sync(&mut self) -> Result<()> {
        if self.unsynced > 0 {
            self.file.sync_data()?;
            self.unsynced = 0;
        }
        Ok(())
    }

    /// Drop every entry; call only after a snapshot has been made durable
    pub fn reset(&mut self) -> Result<()> {
        self.file.set_len(0)?;
        self.file.sync_all()?;
        self.unsynced = 0;
        debug!(path = %self.path.display(), "reset expiry journal");
        Ok(())
    }

    /// Current journal size in bytes
    pub fn len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

//! Tests for the in-memory index and snapshot files
//!
//! These tests verify:
//! - Put/overwrite/delete on the index
//! - Snapshot dump/load with expiry and the checkpoint entry
//! - Rejection of corrupt snapshots
//! - Atomic snapshot writes and cleanup of older generations
//! - The expiry journal: lookups, torn entries, reset

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use logcask::codec::{encode_index_entry, INDEX_ENTRY_SIZE};
use logcask::config::SyncStrategy;
use logcask::index::{
    expiry_journal_path, latest_snapshot_id, read_expiry_journal, read_latest_snapshot,
    snapshot_path, write_snapshot, ExpiryJournal, Index, EXPIRY_ENTRY_SIZE,
};
use logcask::types::{Position, Record};
use logcask::CaskError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

const NOW: u32 = 1_700_000_000;

fn record(segment_id: u64, offset: u32, size: u32) -> Record {
    Record {
        segment_id,
        size,
        offset,
        timestamp: NOW - 10,
        expire_time: 0,
    }
}

fn snapshot_files(index_dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(index_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

// =============================================================================
// Index Operation Tests
// =============================================================================

#[test]
fn test_index_put_get() {
    let mut index = Index::new();
    assert!(index.is_empty());

    assert_eq!(index.put(1, record(1, 0, 30)), None);
    assert_eq!(index.get(1), Some(record(1, 0, 30)));
    assert_eq!(index.len(), 1);
    assert!(index.contains(1));
    assert!(!index.contains(2));
}

#[test]
fn test_index_overwrite_returns_previous() {
    let mut index = Index::new();
    index.put(1, record(1, 0, 30));

    let previous = index.put(1, record(2, 64, 40));
    assert_eq!(previous, Some(record(1, 0, 30)));
    assert_eq!(index.get(1), Some(record(2, 64, 40)));
    assert_eq!(index.len(), 1);
}

#[test]
fn test_index_delete() {
    let mut index = Index::new();
    index.put(1, record(1, 0, 30));

    assert_eq!(index.delete(1), Some(record(1, 0, 30)));
    assert_eq!(index.get(1), None);
    assert_eq!(index.delete(1), None);
    assert!(index.is_empty());
}

#[test]
fn test_record_expiry_rule() {
    let mut r = record(1, 0, 30);
    assert!(!r.is_expired(u32::MAX));

    r.expire_time = NOW;
    assert!(r.is_expired(NOW));
    assert!(!r.is_expired(NOW - 1));
}

// =============================================================================
// Snapshot Dump/Load Tests
// =============================================================================

#[test]
fn test_dump_load_round_trip() {
    let mut index = Index::new();
    index.put(10, record(1, 0, 30));
    index.put(20, record(1, 30, 25));
    index.put(30, record(2, 0, 40));

    let checkpoint = Position {
        segment_id: 2,
        offset: 40,
    };
    let bytes = index.dump_snapshot(checkpoint, NOW);
    assert_eq!(bytes.len(), 4 * INDEX_ENTRY_SIZE);

    let mut loaded = Index::new();
    let load = loaded.load_snapshot(&bytes, NOW).unwrap();

    assert_eq!(load.loaded, 3);
    assert_eq!(load.expired, 1); // checkpoint entry
    assert_eq!(load.high_water, Some(checkpoint));
    assert_eq!(loaded.len(), 3);
    assert_eq!(loaded.get(20), Some(record(1, 30, 25)));
}

#[test]
fn test_dump_skips_expired_entries() {
    let mut index = Index::new();
    index.put(1, record(1, 0, 30));
    index.put(
        2,
        Record {
            expire_time: NOW - 1,
            ..record(1, 30, 30)
        },
    );

    let bytes = index.dump_snapshot(Position::default(), NOW);
    assert_eq!(bytes.len(), 2 * INDEX_ENTRY_SIZE);
}

#[test]
fn test_load_drops_entries_expired_since_dump() {
    let mut index = Index::new();
    index.put(1, record(1, 0, 30));
    index.put(
        2,
        Record {
            expire_time: NOW + 5,
            ..record(1, 30, 30)
        },
    );
    let bytes = index.dump_snapshot(Position { segment_id: 1, offset: 60 }, NOW);

    let mut loaded = Index::new();
    let load = loaded.load_snapshot(&bytes, NOW + 5).unwrap();

    assert_eq!(load.loaded, 1);
    assert_eq!(load.expired, 2);
    assert_eq!(loaded.get(2), None);
    // The expired entry still counts toward the covered position.
    assert_eq!(load.high_water, Some(Position { segment_id: 1, offset: 60 }));
}

#[test]
fn test_load_empty_snapshot() {
    let mut index = Index::new();
    let load = index.load_snapshot(&[], NOW).unwrap();

    assert_eq!(load.loaded, 0);
    assert_eq!(load.high_water, None);
}

#[test]
fn test_load_rejects_partial_entry() {
    let mut index = Index::new();
    index.put(1, record(1, 0, 30));
    let bytes = index.dump_snapshot(Position::default(), NOW);

    let mut loaded = Index::new();
    let result = loaded.load_snapshot(&bytes[..bytes.len() - 1], NOW);
    assert!(matches!(result, Err(CaskError::Corruption(_))));
}

#[test]
fn test_load_corrupt_entry_inserts_nothing() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&encode_index_entry(1, &record(1, 0, 30)));
    let mut bad = encode_index_entry(2, &record(1, 30, 30));
    bad[10] ^= 0x04;
    bytes.extend_from_slice(&bad);

    let mut index = Index::new();
    let result = index.load_snapshot(&bytes, NOW);

    assert!(matches!(result, Err(CaskError::Corruption(_))));
    assert!(index.is_empty());
}

// =============================================================================
// Snapshot File Tests
// =============================================================================

#[test]
fn test_write_and_read_latest_snapshot() {
    let temp = TempDir::new().unwrap();
    let index_dir = temp.path().join("index");

    assert_eq!(read_latest_snapshot(&index_dir.join("missing")).ok().flatten(), None);

    let id = write_snapshot(&index_dir, b"snapshot-bytes", NOW).unwrap();
    assert_eq!(id, NOW as u64);
    assert!(snapshot_path(&index_dir, id).exists());

    let (latest, bytes) = read_latest_snapshot(&index_dir).unwrap().unwrap();
    assert_eq!(latest, id);
    assert_eq!(bytes, b"snapshot-bytes");
}

#[test]
fn test_write_snapshot_removes_older_generations() {
    let temp = TempDir::new().unwrap();
    let index_dir = temp.path();

    write_snapshot(index_dir, b"one", NOW).unwrap();
    write_snapshot(index_dir, b"two", NOW + 10).unwrap();

    assert_eq!(snapshot_files(index_dir), vec![format!("{}.idx", NOW + 10)]);
    assert_eq!(latest_snapshot_id(index_dir).unwrap(), Some((NOW + 10) as u64));
}

#[test]
fn test_write_snapshot_never_goes_backwards() {
    let temp = TempDir::new().unwrap();
    let index_dir = temp.path();

    write_snapshot(index_dir, b"newer", NOW + 100).unwrap();
    let id = write_snapshot(index_dir, b"clock went back", NOW).unwrap();

    assert_eq!(id, (NOW + 100) as u64);
    let (_, bytes) = read_latest_snapshot(index_dir).unwrap().unwrap();
    assert_eq!(bytes, b"clock went back");
    assert_eq!(snapshot_files(index_dir).len(), 1);
}

#[test]
fn test_write_snapshot_cleans_leftover_temp_files() {
    let temp = TempDir::new().unwrap();
    let index_dir = temp.path();
    fs::write(index_dir.join("123.idx.tmp"), b"torn").unwrap();

    write_snapshot(index_dir, b"good", NOW).unwrap();

    assert_eq!(snapshot_files(index_dir), vec![format!("{}.idx", NOW)]);
}

#[test]
fn test_latest_snapshot_ignores_other_files() {
    let temp = TempDir::new().unwrap();
    let index_dir = temp.path();
    fs::write(index_dir.join("999999999999.tmp"), b"x").unwrap();
    fs::write(index_dir.join("notes.txt"), b"x").unwrap();
    fs::write(index_dir.join("5.idx"), b"").unwrap();

    assert_eq!(latest_snapshot_id(index_dir).unwrap(), Some(5));
}

// =============================================================================
// Expiry Journal Tests
// =============================================================================

#[test]
fn test_expiry_journal_lookup() {
    let temp = TempDir::new().unwrap();
    let mut journal = ExpiryJournal::open(temp.path(), SyncStrategy::EveryWrite).unwrap();
    journal.append(1, 0, 0xaa, NOW + 60).unwrap();
    journal.append(1, 48, 0xbb, NOW - 60).unwrap();
    assert_eq!(journal.len().unwrap(), 2 * EXPIRY_ENTRY_SIZE as u64);

    let map = read_expiry_journal(temp.path()).unwrap();
    assert_eq!(map.len(), 2);
    assert_eq!(map.lookup(1, 0, 0xaa), Some(NOW + 60));
    assert_eq!(map.lookup(1, 48, 0xbb), Some(NOW - 60));

    // Same position, different key.
    assert_eq!(map.lookup(1, 0, 0xbb), None);
    assert_eq!(map.lookup(2, 0, 0xaa), None);
}

#[test]
fn test_expiry_journal_missing_is_empty() {
    let temp = TempDir::new().unwrap();

    let map = read_expiry_journal(temp.path()).unwrap();
    assert!(map.is_empty());
}

#[test]
fn test_expiry_journal_ignores_partial_entry() {
    let temp = TempDir::new().unwrap();
    {
        let mut journal = ExpiryJournal::open(temp.path(), SyncStrategy::EveryWrite).unwrap();
        journal.append(1, 0, 0xaa, NOW).unwrap();
    }

    let path = expiry_journal_path(temp.path());
    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&[0x11; 10]).unwrap();
    drop(file);

    let map = read_expiry_journal(temp.path()).unwrap();
    assert_eq!(map.len(), 1);

    // Reopening for append cuts the partial entry off.
    let journal = ExpiryJournal::open(temp.path(), SyncStrategy::EveryWrite).unwrap();
    assert_eq!(journal.len().unwrap(), EXPIRY_ENTRY_SIZE as u64);
}

#[test]
fn test_expiry_journal_ignores_damaged_last_entry() {
    let temp = TempDir::new().unwrap();
    {
        let mut journal = ExpiryJournal::open(temp.path(), SyncStrategy::EveryWrite).unwrap();
        journal.append(1, 0, 0xaa, NOW).unwrap();
        journal.append(1, 48, 0xbb, NOW).unwrap();
    }

    let path = expiry_journal_path(temp.path());
    let mut bytes = fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    fs::write(&path, &bytes).unwrap();

    let map = read_expiry_journal(temp.path()).unwrap();
    assert_eq!(map.len(), 1);
    assert_eq!(map.lookup(1, 48, 0xbb), None);
}

#[test]
fn test_expiry_journal_corrupt_entry_is_error() {
    let temp = TempDir::new().unwrap();
    {
        let mut journal = ExpiryJournal::open(temp.path(), SyncStrategy::EveryWrite).unwrap();
        journal.append(1, 0, 0xaa, NOW).unwrap();
        journal.append(1, 48, 0xbb, NOW).unwrap();
    }

    let path = expiry_journal_path(temp.path());
    let mut bytes = fs::read(&path).unwrap();
    bytes[10] ^= 0xff;
    fs::write(&path, &bytes).unwrap();

    let result = read_expiry_journal(temp.path());
    assert!(matches!(result, Err(CaskError::Corruption(_))));
}

#[test]
fn test_expiry_journal_reset() {
    let temp = TempDir::new().unwrap();
    let mut journal = ExpiryJournal::open(temp.path(), SyncStrategy::EveryWrite).unwrap();
    journal.append(1, 0, 0xaa, NOW).unwrap();

    journal.reset().unwrap();
    assert!(journal.is_empty().unwrap());

    // Appends continue at the start of the emptied file.
    journal.append(2, 0, 0xcc, NOW).unwrap();
    let map = read_expiry_journal(temp.path()).unwrap();
    assert_eq!(map.len(), 1);
    assert_eq!(map.lookup(2, 0, 0xcc), Some(NOW));
}

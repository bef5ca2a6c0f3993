//! Tests for the Segment Store
//!
//! These tests verify:
//! - Active segment selection on open
//! - Append offsets and rotation at the size threshold
//! - Point reads through cached read handles
//! - Sequential scanning, including torn tails
//! - Removal of old segments

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use logcask::codec::{decode_record, encode_record};
use logcask::config::SyncStrategy;
use logcask::segment::{segment_path, total_bytes_on_disk, SegmentScanner, SegmentStore};
use logcask::types::Record;
use logcask::CaskError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn open_store(dir: &Path, max_segment_size: u64) -> SegmentStore {
    SegmentStore::open(dir, max_segment_size, SyncStrategy::EveryWrite).unwrap()
}

fn item(i: usize) -> Vec<u8> {
    encode_record(
        1_700_000_000,
        format!("key{:03}", i).as_bytes(),
        Some(format!("value{:03}", i).as_bytes()),
    )
    .unwrap()
    .to_vec()
}

// =============================================================================
// Open Tests
// =============================================================================

#[test]
fn test_open_empty_dir_creates_segment_one() {
    let temp = TempDir::new().unwrap();
    let store = open_store(temp.path(), 1024);

    assert_eq!(store.active_id(), 1);
    assert_eq!(store.active_offset(), 0);
    assert!(segment_path(temp.path(), 1).exists());
    assert_eq!(store.segment_count().unwrap(), 1);
}

#[test]
fn test_open_reuses_partial_segment() {
    let temp = TempDir::new().unwrap();
    {
        let mut store = open_store(temp.path(), 1024);
        store.append(&item(0)).unwrap();
    }

    let store = open_store(temp.path(), 1024);
    assert_eq!(store.active_id(), 1);
    assert_eq!(store.active_offset(), item(0).len() as u64);
}

#[test]
fn test_open_starts_new_segment_after_full_one() {
    let temp = TempDir::new().unwrap();
    {
        let mut store = open_store(temp.path(), 64);
        store.append(&item(0)).unwrap();
        store.append(&item(1)).unwrap();
        store.append(&item(2)).unwrap();
    }

    let store = open_store(temp.path(), 64);
    assert_eq!(store.active_id(), 2);
    assert_eq!(store.active_offset(), 0);
}

// =============================================================================
// Append Tests
// =============================================================================

#[test]
fn test_append_offsets_are_contiguous() {
    let temp = TempDir::new().unwrap();
    let mut store = open_store(temp.path(), 1024 * 1024);

    let mut expected_offset = 0u32;
    for i in 0..10 {
        let bytes = item(i);
        let appended = store.append(&bytes).unwrap();

        assert_eq!(appended.segment_id, 1);
        assert_eq!(appended.offset, expected_offset);
        assert_eq!(appended.size as usize, bytes.len());
        expected_offset += appended.size;
    }

    assert_eq!(store.active_offset(), expected_offset as u64);
    assert_eq!(
        fs::metadata(segment_path(temp.path(), 1)).unwrap().len(),
        expected_offset as u64
    );
}

#[test]
fn test_rotate_if_full() {
    let temp = TempDir::new().unwrap();
    let mut store = open_store(temp.path(), 64);

    assert!(!store.rotate_if_full().unwrap());
    store.append(&item(0)).unwrap();
    store.append(&item(1)).unwrap();
    store.append(&item(2)).unwrap();

    assert!(store.rotate_if_full().unwrap());
    assert_eq!(store.active_id(), 2);
    assert_eq!(store.active_offset(), 0);
    assert_eq!(store.segment_ids().unwrap(), vec![1, 2]);
}

#[test]
fn test_segment_may_overshoot_threshold() {
    let temp = TempDir::new().unwrap();
    let mut store = open_store(temp.path(), 30);

    // Rotation only happens before an append, never mid-record.
    assert!(!store.rotate_if_full().unwrap());
    let a = store.append(&item(0)).unwrap();
    assert!(store.rotate_if_full().unwrap());
    let b = store.append(&item(1)).unwrap();

    assert_eq!(a.segment_id, 1);
    assert!(a.size > 30);
    assert_eq!(b.segment_id, 2);
    assert_eq!(
        fs::metadata(segment_path(temp.path(), 1)).unwrap().len(),
        a.size as u64
    );
}

#[test]
fn test_create_active_segment() {
    let temp = TempDir::new().unwrap();
    let mut store = open_store(temp.path(), 1024);
    store.append(&item(0)).unwrap();

    let id = store.create_active_segment().unwrap();
    assert_eq!(id, 2);
    assert_eq!(store.active_id(), 2);

    let appended = store.append(&item(1)).unwrap();
    assert_eq!(appended.segment_id, 2);
    assert_eq!(appended.offset, 0);
}

#[test]
fn test_checkpoint_tracks_write_cursor() {
    let temp = TempDir::new().unwrap();
    let mut store = open_store(temp.path(), 1024);
    let appended = store.append(&item(0)).unwrap();

    let checkpoint = store.checkpoint();
    assert_eq!(checkpoint.segment_id, 1);
    assert_eq!(checkpoint.offset, appended.size as u64);
}

#[test]
fn test_sync_strategy_every_n_entries() {
    let temp = TempDir::new().unwrap();
    let mut store =
        SegmentStore::open(temp.path(), 1024, SyncStrategy::EveryNEntries { count: 3 }).unwrap();

    for i in 0..5 {
        store.append(&item(i)).unwrap();
    }
    store.sync().unwrap();

    assert_eq!(
        fs::metadata(segment_path(temp.path(), 1)).unwrap().len(),
        store.active_offset()
    );
}

// =============================================================================
// Read Tests
// =============================================================================

#[test]
fn test_read_appended_record() {
    let temp = TempDir::new().unwrap();
    let mut store = open_store(temp.path(), 1024 * 1024);

    let mut records = Vec::new();
    for i in 0..5 {
        let appended = store.append(&item(i)).unwrap();
        records.push(Record {
            segment_id: appended.segment_id,
            size: appended.size,
            offset: appended.offset,
            timestamp: 0,
            expire_time: 0,
        });
    }

    for (i, record) in records.iter().enumerate() {
        let decoded = decode_record(&store.read(record).unwrap()).unwrap();
        assert_eq!(decoded.key, format!("key{:03}", i).into_bytes());
    }

    assert_eq!(store.open_reader_count(), 1);
}

#[test]
fn test_read_from_sealed_segment() {
    let temp = TempDir::new().unwrap();
    let mut store = open_store(temp.path(), 1024);

    let appended = store.append(&item(7)).unwrap();
    store.create_active_segment().unwrap();
    store.append(&item(8)).unwrap();

    let record = Record {
        segment_id: appended.segment_id,
        size: appended.size,
        offset: appended.offset,
        timestamp: 0,
        expire_time: 0,
    };
    let decoded = decode_record(&store.read(&record).unwrap()).unwrap();
    assert_eq!(decoded.value, Some(b"value007".to_vec()));
}

#[test]
fn test_open_for_read_missing_segment() {
    let temp = TempDir::new().unwrap();
    let store = open_store(temp.path(), 1024);

    let result = store.open_for_read(42);
    assert!(matches!(result, Err(CaskError::Corruption(_))));
}

#[test]
fn test_read_past_end_is_corruption() {
    let temp = TempDir::new().unwrap();
    let mut store = open_store(temp.path(), 1024);
    store.append(&item(0)).unwrap();

    let record = Record {
        segment_id: 1,
        size: 1000,
        offset: 0,
        timestamp: 0,
        expire_time: 0,
    };
    assert!(matches!(store.read(&record), Err(CaskError::Corruption(_))));
}

#[test]
fn test_close_readers() {
    let temp = TempDir::new().unwrap();
    let store = open_store(temp.path(), 1024);

    store.open_for_read(1).unwrap();
    assert_eq!(store.open_reader_count(), 1);

    store.close_readers();
    assert_eq!(store.open_reader_count(), 0);
}

// =============================================================================
// Scanner Tests
// =============================================================================

#[test]
fn test_scanner_yields_items_in_order() {
    let temp = TempDir::new().unwrap();
    {
        let mut store = open_store(temp.path(), 1024 * 1024);
        for i in 0..5 {
            store.append(&item(i)).unwrap();
        }
        store.append(&encode_record(1, b"key002", None).unwrap()).unwrap();
    }

    let path = segment_path(temp.path(), 1);
    let scanned: Vec<_> = SegmentScanner::open(&path, 1, 0)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(scanned.len(), 6);
    assert_eq!(scanned[0].offset, 0);
    assert_eq!(scanned[1].offset, scanned[0].size as u64);
    assert_eq!(scanned[3].item.key, b"key003");
    assert!(scanned[5].item.is_tombstone());
}

#[test]
fn test_scanner_from_offset() {
    let temp = TempDir::new().unwrap();
    let second_offset;
    {
        let mut store = open_store(temp.path(), 1024 * 1024);
        store.append(&item(0)).unwrap();
        second_offset = store.append(&item(1)).unwrap().offset;
        store.append(&item(2)).unwrap();
    }

    let path = segment_path(temp.path(), 1);
    let keys: Vec<Vec<u8>> = SegmentScanner::open(&path, 1, second_offset as u64)
        .unwrap()
        .map(|r| r.unwrap().item.key)
        .collect();

    assert_eq!(keys, vec![b"key001".to_vec(), b"key002".to_vec()]);
}

#[test]
fn test_scanner_start_past_end() {
    let temp = TempDir::new().unwrap();
    open_store(temp.path(), 1024);

    let result = SegmentScanner::open(&segment_path(temp.path(), 1), 1, 10);
    assert!(matches!(result, Err(CaskError::Corruption(_))));
}

#[test]
fn test_scanner_stops_at_torn_tail() {
    let temp = TempDir::new().unwrap();
    let good_len;
    {
        let mut store = open_store(temp.path(), 1024 * 1024);
        store.append(&item(0)).unwrap();
        store.append(&item(1)).unwrap();
        good_len = store.active_offset();
    }

    let path = segment_path(temp.path(), 1);
    let partial = item(2);
    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&partial[..partial.len() / 2]).unwrap();
    drop(file);

    let mut scanner = SegmentScanner::open(&path, 1, 0).unwrap();
    assert!(scanner.next().unwrap().is_ok());
    assert!(scanner.next().unwrap().is_ok());
    assert!(matches!(scanner.next(), Some(Err(CaskError::Corruption(_)))));
    assert!(scanner.next().is_none());

    assert!(scanner.stopped_early());
    assert!(scanner.is_torn());
    assert_eq!(scanner.position(), good_len);
}

#[test]
fn test_scanner_bad_checksum_on_last_record_is_torn() {
    let temp = TempDir::new().unwrap();
    let last_offset;
    {
        let mut store = open_store(temp.path(), 1024 * 1024);
        store.append(&item(0)).unwrap();
        last_offset = store.append(&item(1)).unwrap().offset;
    }

    // The write of the final record was cut short inside its value.
    let path = segment_path(temp.path(), 1);
    let mut bytes = fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    fs::write(&path, &bytes).unwrap();

    let mut scanner = SegmentScanner::open(&path, 1, 0).unwrap();
    let results: Vec<_> = scanner.by_ref().collect();

    assert_eq!(results.len(), 2);
    assert!(results[1].is_err());
    assert!(scanner.is_torn());
    assert_eq!(scanner.position(), last_offset as u64);
}

#[test]
fn test_scanner_stops_at_corrupt_record() {
    let temp = TempDir::new().unwrap();
    let second_offset;
    {
        let mut store = open_store(temp.path(), 1024 * 1024);
        store.append(&item(0)).unwrap();
        second_offset = store.append(&item(1)).unwrap().offset;
        store.append(&item(2)).unwrap();
    }

    let path = segment_path(temp.path(), 1);
    let mut bytes = fs::read(&path).unwrap();
    bytes[second_offset as usize + 22] ^= 0xff;
    fs::write(&path, &bytes).unwrap();

    let mut scanner = SegmentScanner::open(&path, 1, 0).unwrap();
    let results: Vec<_> = scanner.by_ref().collect();

    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    assert!(results[1].is_err());
    assert_eq!(scanner.position(), second_offset as u64);

    // A complete record follows, so this is damage rather than a torn write.
    assert!(scanner.stopped_early());
    assert!(!scanner.is_torn());
}

// =============================================================================
// Cleanup Tests
// =============================================================================

#[test]
fn test_total_bytes_on_disk() {
    let temp = TempDir::new().unwrap();
    let mut store = open_store(temp.path(), 64);

    let mut written = 0u64;
    for i in 0..6 {
        store.rotate_if_full().unwrap();
        written += store.append(&item(i)).unwrap().size as u64;
    }

    assert_eq!(store.total_bytes_on_disk().unwrap(), written);
    assert_eq!(total_bytes_on_disk(temp.path()).unwrap(), written);
}

#[test]
fn test_remove_segments_before() {
    let temp = TempDir::new().unwrap();
    let mut store = open_store(temp.path(), 1024);

    store.append(&item(0)).unwrap();
    store.create_active_segment().unwrap();
    store.append(&item(1)).unwrap();
    store.open_for_read(1).unwrap();
    let first_kept = store.create_active_segment().unwrap();

    let removed = store.remove_segments_before(first_kept).unwrap();

    assert_eq!(removed, vec![1, 2]);
    assert_eq!(store.segment_ids().unwrap(), vec![3]);
    assert_eq!(store.open_reader_count(), 0);
    assert!(!segment_path(temp.path(), 1).exists());
}

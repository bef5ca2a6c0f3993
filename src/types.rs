//! Shared types
//!
//! Identifiers and the record locator stored in the index.

use std::time::{SystemTime, UNIX_EPOCH};

/// Identifier of a segment file (`<id>.data`)
pub type SegmentId = u64;

/// 64-bit hash of a key, used as the index key
pub type Fingerprint = u64;

/// Location and metadata of the most recent value for a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record {
    /// Segment holding the encoded item
    pub segment_id: SegmentId,
    /// Length of the encoded item in bytes
    pub size: u32,
    /// Byte offset of the item within the segment
    pub offset: u32,
    /// Creation time (unix seconds)
    pub timestamp: u32,
    /// Absolute expiry time (unix seconds), 0 = never
    pub expire_time: u32,
}

impl Record {
    /// A record with an expiry of 0 never expires
    pub fn is_expired(&self, now: u32) -> bool {
        self.expire_time != 0 && self.expire_time <= now
    }

    /// Position just past the end of this record
    pub fn end(&self) -> Position {
        Position {
            segment_id: self.segment_id,
            offset: self.offset as u64 + self.size as u64,
        }
    }
}

/// A point in the append-only log: segment id then byte offset.
///
/// Ordering follows write order, so the greater position was written later.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Position {
    pub segment_id: SegmentId,
    pub offset: u64,
}

/// Current unix time in seconds, saturating at `u32::MAX`
pub fn unix_now() -> u32 {
    to_unix_secs(SystemTime::now())
}

/// Convert a wall-clock instant to unix seconds as stored on disk.
///
/// Instants before the epoch map to 0.
pub fn to_unix_secs(time: SystemTime) -> u32 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => u32::try_from(d.as_secs()).unwrap_or(u32::MAX),
        Err(_) => 0,
    }
}

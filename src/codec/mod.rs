//! Codec Module
//!
//! Binary layouts for log records and index snapshot entries.
//!
//! ## Responsibilities
//! - Encode items appended to segments
//! - Decode and verify items read back from segments
//! - Encode/decode the fixed-size entries of an index snapshot
//! - CRC32 over everything after the checksum field
//!
//! ## Record Format (little-endian)
//! ```text
//! ┌─────────┬───────────────┬───────────┬───────────┬─────┬───────┐
//! │ CRC (4) │ Timestamp (8) │ KeyLen(4) │ ValLen(4) │ Key │ Value │
//! └─────────┴───────────────┴───────────┴───────────┴─────┴───────┘
//! ```
//! (ValLen = u32::MAX marks a tombstone, no value bytes follow)
//!
//! ## Index Entry Format (little-endian, 36 bytes)
//! ```text
//! ┌─────────┬─────────────────┬────────────────┬─────────────┬─────────────┬──────────┬────────────┐
//! │ CRC (4) │ Fingerprint (8) │ SegmentId (8)  │ Created (4) │ Expires (4) │ Size (4) │ Offset (4) │
//! └─────────┴─────────────────┴────────────────┴─────────────┴─────────────┴──────────┴────────────┘
//! ```

mod entry;
mod record;

pub use entry::{decode_index_entry, encode_index_entry, INDEX_ENTRY_SIZE};
pub use record::{
    decode_record, encode_record, record_len, Item, RECORD_HEADER_SIZE, TOMBSTONE_MARKER,
};

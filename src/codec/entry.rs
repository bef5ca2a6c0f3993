//! Index snapshot entry encoding

use bytes::{Buf, BufMut};

use crate::error::{CaskError, Result};
use crate::types::{Fingerprint, Record};

/// Fixed size of one snapshot entry
pub const INDEX_ENTRY_SIZE: usize = 36;

/// Encode one index entry
pub fn encode_index_entry(fingerprint: Fingerprint, record: &Record) -> [u8; INDEX_ENTRY_SIZE] {
    let mut buf = [0u8; INDEX_ENTRY_SIZE];
    {
        let mut body = &mut buf[4..];
        body.put_u64_le(fingerprint);
        body.put_u64_le(record.segment_id);
        body.put_u32_le(record.timestamp);
        body.put_u32_le(record.expire_time);
        body.put_u32_le(record.size);
        body.put_u32_le(record.offset);
    }

    let crc = crc32fast::hash(&buf[4..]);
    buf[0..4].copy_from_slice(&crc.to_le_bytes());
    buf
}

/// Decode and verify one index entry
pub fn decode_index_entry(bytes: &[u8]) -> Result<(Fingerprint, Record)> {
    if bytes.len() != INDEX_ENTRY_SIZE {
        return Err(CaskError::Corruption(format!(
            "index entry must be {} bytes, got {}",
            INDEX_ENTRY_SIZE,
            bytes.len()
        )));
    }

    let mut cursor = bytes;
    let stored_crc = cursor.get_u32_le();
    if stored_crc != crc32fast::hash(&bytes[4..]) {
        return Err(CaskError::Corruption(
            "index entry checksum mismatch".to_string(),
        ));
    }

    let fingerprint = cursor.get_u64_le();
    let record = Record {
        segment_id: cursor.get_u64_le(),
        timestamp: cursor.get_u32_le(),
        expire_time: cursor.get_u32_le(),
        size: cursor.get_u32_le(),
        offset: cursor.get_u32_le(),
    };

    Ok((fingerprint, record))
}

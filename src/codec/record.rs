//! Log record encoding
//!
//! Items are the unit appended to segments. Each carries its own CRC so a
//! record can be verified in isolation from the rest of the segment.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{CaskError, Result};

/// CRC (4) + Timestamp (8) + KeyLen (4) + ValLen (4) = 20 bytes
pub const RECORD_HEADER_SIZE: usize = 20;

/// Value-length sentinel marking a tombstone (deleted key)
pub const TOMBSTONE_MARKER: u32 = u32::MAX;

/// A decoded log record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// Creation time (unix seconds)
    pub timestamp: u64,
    /// Checksum stored in the record header
    pub crc32: u32,
    pub key: Vec<u8>,
    /// `None` for a tombstone
    pub value: Option<Vec<u8>>,
}

impl Item {
    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }

    /// Size of this item once encoded
    pub fn encoded_len(&self) -> usize {
        RECORD_HEADER_SIZE + self.key.len() + self.value.as_ref().map_or(0, Vec::len)
    }
}

/// Encode a record (value `None` encodes a tombstone).
///
/// The output is exactly `RECORD_HEADER_SIZE + key.len() + value.len()` bytes.
pub fn encode_record(timestamp: u64, key: &[u8], value: Option<&[u8]>) -> Result<Bytes> {
    let key_len = u32::try_from(key.len())
        .map_err(|_| CaskError::InvalidArgument(format!("key too large: {} bytes", key.len())))?;

    let val_len = match value {
        Some(v) => match u32::try_from(v.len()) {
            Ok(len) if len != TOMBSTONE_MARKER => len,
            _ => {
                return Err(CaskError::InvalidArgument(format!(
                    "value too large: {} bytes",
                    v.len()
                )))
            }
        },
        None => TOMBSTONE_MARKER,
    };

    let total = RECORD_HEADER_SIZE + key.len() + value.map_or(0, <[u8]>::len);
    let mut buf = BytesMut::with_capacity(total);

    buf.put_u32_le(0); // CRC placeholder
    buf.put_u64_le(timestamp);
    buf.put_u32_le(key_len);
    buf.put_u32_le(val_len);
    buf.put_slice(key);
    if let Some(v) = value {
        buf.put_slice(v);
    }

    let crc = crc32fast::hash(&buf[4..]);
    buf[0..4].copy_from_slice(&crc.to_le_bytes());

    Ok(buf.freeze())
}

/// Total encoded length of the record whose header starts `header`.
///
/// Only the length fields are read; the CRC is checked by [`decode_record`].
pub fn record_len(header: &[u8]) -> Result<u64> {
    if header.len() < RECORD_HEADER_SIZE {
        return Err(CaskError::Corruption(format!(
            "record header truncated: {} of {} bytes",
            header.len(),
            RECORD_HEADER_SIZE
        )));
    }

    let mut cursor = &header[12..RECORD_HEADER_SIZE];
    let key_len = cursor.get_u32_le() as u64;
    let val_len = match cursor.get_u32_le() {
        TOMBSTONE_MARKER => 0,
        len => len as u64,
    };

    Ok(RECORD_HEADER_SIZE as u64 + key_len + val_len)
}

/// Decode and verify a record
pub fn decode_record(bytes: &[u8]) -> Result<Item> {
    let expected_len = record_len(bytes)?;
    if bytes.len() as u64 != expected_len {
        return Err(CaskError::Corruption(format!(
            "record length mismatch: header declares {} bytes, got {}",
            expected_len,
            bytes.len()
        )));
    }

    let mut cursor = bytes;
    let stored_crc = cursor.get_u32_le();
    let computed_crc = crc32fast::hash(&bytes[4..]);
    if stored_crc != computed_crc {
        return Err(CaskError::Corruption(format!(
            "record checksum mismatch: stored {:#010x}, computed {:#010x}",
            stored_crc, computed_crc
        )));
    }

    let timestamp = cursor.get_u64_le();
    let key_len = cursor.get_u32_le() as usize;
    let val_len = cursor.get_u32_le();

    let key = cursor[..key_len].to_vec();
    let value = match val_len {
        TOMBSTONE_MARKER => None,
        len => Some(cursor[key_len..key_len + len as usize].to_vec()),
    };

    Ok(Item {
        timestamp,
        crc32: stored_crc,
        key,
        value,
    })
}

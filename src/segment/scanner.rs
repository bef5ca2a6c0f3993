//! Segment Scanner
//!
//! Sequential iteration over the items of a segment, used by recovery replay.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::codec::{decode_record, record_len, Item, RECORD_HEADER_SIZE};
use crate::error::{CaskError, Result};
use crate::types::SegmentId;

/// An item together with its location in the segment
#[derive(Debug, Clone)]
pub struct ScannedItem {
    pub offset: u64,
    pub size: u32,
    pub item: Item,
}

/// Iterator over the items of one segment, in write order.
///
/// Stops after the first truncated or corrupt item; [`position`](Self::position)
/// then points just past the last good item and [`is_torn`](Self::is_torn)
/// tells an interrupted final write apart from damage to complete data.
pub struct SegmentScanner {
    id: SegmentId,
    file: BufReader<File>,
    file_len: u64,
    /// End of the last item successfully read
    position: u64,
    failed: bool,
    /// The failing item ran into the end of the file
    torn: bool,
}

impl SegmentScanner {
    /// Open a segment and start scanning at `start`
    pub fn open(path: &Path, id: SegmentId, start: u64) -> Result<Self> {
        let mut file = File::open(path)?;
        let file_len = file.metadata()?.len();

        if start > file_len {
            return Err(CaskError::Corruption(format!(
                "segment {} is {} bytes, cannot scan from offset {}",
                id, file_len, start
            )));
        }
        file.seek(SeekFrom::Start(start))?;

        Ok(Self {
            id,
            file: BufReader::new(file),
            file_len,
            position: start,
            failed: false,
            torn: false,
        })
    }

    pub fn id(&self) -> SegmentId {
        self.id
    }

    /// Offset just past the last item read successfully
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Length of the file when the scan started
    pub fn file_len(&self) -> u64 {
        self.file_len
    }

    /// True once the scan hit a truncated or corrupt item
    pub fn stopped_early(&self) -> bool {
        self.failed
    }

    /// True when the scan stopped at the tail of the file: an incomplete
    /// header, a declared length past EOF, or a bad checksum on an item that
    /// ends exactly at EOF. Nothing valid can follow such an item.
    pub fn is_torn(&self) -> bool {
        self.torn
    }

    fn read_item(&mut self) -> Result<ScannedItem> {
        let remaining = self.file_len - self.position;
        if remaining < RECORD_HEADER_SIZE as u64 {
            self.torn = true;
            return Err(CaskError::Corruption(format!(
                "truncated record header at {} in segment {}",
                self.position, self.id
            )));
        }

        let mut header = [0u8; RECORD_HEADER_SIZE];
        self.file.read_exact(&mut header)?;

        let len = record_len(&header)?;
        if len > remaining {
            self.torn = true;
            return Err(CaskError::Corruption(format!(
                "truncated record at {} in segment {}: needs {} bytes, {} left",
                self.position, self.id, len, remaining
            )));
        }

        let mut buf = vec![0u8; len as usize];
        buf[..RECORD_HEADER_SIZE].copy_from_slice(&header);
        self.file.read_exact(&mut buf[RECORD_HEADER_SIZE..])?;

        let item = decode_record(&buf).map_err(|e| {
            self.torn = len == remaining;
            e
        })?;
        let size = u32::try_from(len).map_err(|_| {
            CaskError::Corruption(format!("record of {} bytes in segment {}", len, self.id))
        })?;

        Ok(ScannedItem {
            offset: self.position,
            size,
            item,
        })
    }
}

impl Iterator for SegmentScanner {
    type Item = Result<ScannedItem>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.position >= self.file_len {
            return None;
        }

        match self.read_item() {
            Ok(scanned) => {
                self.position += scanned.size as u64;
                Some(Ok(scanned))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

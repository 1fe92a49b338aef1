//! Sorted IP index and range search.
//!
//! The file header holds two absolute offsets, `index_start` and `index_end`,
//! bracketing a run of 7-byte entries:
//!
//! ```text
//! ┌────────────┬──────────────────┐
//! │ start_ip   │ record_offset    │
//! │ u32 LE     │ u24 LE           │
//! └────────────┴──────────────────┘
//! ```
//!
//! Entry *i* covers `[start_ip_i, start_ip_{i+1})`. The record it points at
//! begins with the range's last address, which the search reads to decide
//! whether a candidate entry really contains the address.

use crate::buffer::{DatabaseBuffer, Offset};
use crate::error::{LocationError, Result};
use serde::Serialize;

/// Size of the file header in bytes
pub const HEADER_SIZE: usize = 8;

/// Size of one index entry in bytes
pub const INDEX_ENTRY_SIZE: usize = 7;

/// Parsed file header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexHeader {
    /// Offset of the first index entry
    pub index_start: u32,
    /// Offset of the last index entry
    pub index_end: u32,
}

impl IndexHeader {
    /// Read and check the header of a database buffer.
    ///
    /// The index must be non-empty, a whole number of entries long, and lie
    /// entirely inside the buffer.
    pub fn from_buffer(buffer: &DatabaseBuffer) -> Result<Self> {
        let index_start = buffer.read_u32(0)?;
        let index_end = buffer.read_u32(4)?;

        if index_end < index_start {
            return Err(LocationError::Decode(format!(
                "index end {} precedes index start {}",
                index_end, index_start
            )));
        }

        let span = (index_end - index_start) as usize;
        if span % INDEX_ENTRY_SIZE != 0 {
            return Err(LocationError::Decode(format!(
                "index span {} is not a multiple of {}",
                span, INDEX_ENTRY_SIZE
            )));
        }

        let last = index_end as usize;
        if buffer.get_slice(last, INDEX_ENTRY_SIZE).is_none() {
            return Err(LocationError::OutOfBounds {
                offset: last,
                width: INDEX_ENTRY_SIZE,
                len: buffer.len(),
            });
        }

        Ok(Self {
            index_start,
            index_end,
        })
    }

    /// Number of index entries
    pub fn entry_count(&self) -> usize {
        (self.index_end - self.index_start) as usize / INDEX_ENTRY_SIZE + 1
    }
}

/// One decoded index entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexEntry {
    /// First address of the range
    pub start_ip: u32,
    /// Offset of the location record for the range
    pub record_offset: u32,
}

/// Binary search over the index of a loaded database
pub struct IndexSearcher<'a> {
    buffer: &'a DatabaseBuffer,
    header: &'a IndexHeader,
}

impl<'a> IndexSearcher<'a> {
    /// Create a searcher over an already-validated header
    pub fn new(buffer: &'a DatabaseBuffer, header: &'a IndexHeader) -> Self {
        Self { buffer, header }
    }

    /// Number of index entries
    pub fn entry_count(&self) -> usize {
        self.header.entry_count()
    }

    /// Read entry `index`
    pub fn entry(&self, index: usize) -> Result<IndexEntry> {
        if index >= self.entry_count() {
            return Err(LocationError::Decode(format!(
                "index entry {} out of range (count {})",
                index,
                self.entry_count()
            )));
        }

        let offset = self.entry_position(index);
        Ok(IndexEntry {
            start_ip: self.buffer.read_u32(offset)?,
            record_offset: self.buffer.read_u24(offset + 4)?,
        })
    }

    /// Iterate all entries in index order
    pub fn entries(&self) -> impl Iterator<Item = Result<IndexEntry>> + '_ {
        (0..self.entry_count()).map(move |i| self.entry(i))
    }

    /// Last address covered by `entry`, read from the head of its record
    pub fn end_ip(&self, entry: &IndexEntry) -> Result<u32> {
        self.buffer.read_u32(entry.record_offset as Offset)
    }

    /// Find the record offset for `ip`.
    pub fn find_offset(&self, ip: u32) -> Result<u32> {
        let index = self.find_entry(ip)?;
        Ok(self.entry(index)?.record_offset)
    }

    /// Find the index of the entry whose range contains `ip`.
    ///
    /// A probe whose start is below `ip` is only accepted once the end address
    /// stored in its record reaches `ip`; otherwise the search moves right. If
    /// the range empties without a match, the last probed entry is returned.
    pub fn find_entry(&self, ip: u32) -> Result<usize> {
        let mut low = 0usize;
        let mut high = self.entry_count() - 1;
        let mut last = 0usize;

        while low <= high {
            let mid = low + (high - low) / 2;
            let entry = self.entry(mid)?;
            last = mid;

            tracing::trace!(low, high, mid, start_ip = entry.start_ip, ip, "index probe");

            if entry.start_ip > ip {
                if mid == 0 {
                    break;
                }
                high = mid - 1;
                continue;
            }

            if entry.start_ip == ip {
                return Ok(mid);
            }

            if self.end_ip(&entry)? >= ip {
                return Ok(mid);
            }

            low = mid + 1;
        }

        tracing::debug!(ip, last, "index search exhausted, using last probe");
        Ok(last)
    }

    fn entry_position(&self, index: usize) -> Offset {
        self.header.index_start as Offset + index * INDEX_ENTRY_SIZE
    }
}

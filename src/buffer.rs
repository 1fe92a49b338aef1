//! Bounds-checked access to a loaded database file.
//!
//! The whole file is held in one immutable region, either copied into an owned
//! `Vec<u8>` or memory-mapped read-only. Every read in the crate goes through
//! [`DatabaseBuffer::read_uint`] or [`DatabaseBuffer::read_cstring`], which
//! return [`LocationError::OutOfBounds`] instead of touching memory past the end.
//!
//! # Example
//!
//! ```
//! use iplocation::buffer::DatabaseBuffer;
//!
//! let buf = DatabaseBuffer::from_bytes(vec![0x78, 0x56, 0x34, 0x12, b'C', b'N', 0]);
//! assert_eq!(buf.read_u32(0)?, 0x12345678);
//! assert_eq!(buf.read_cstring(4)?, b"CN");
//! assert!(buf.read_u32(4).is_err());
//! # Ok::<(), iplocation::LocationError>(())
//! ```

use crate::error::{LocationError, Result};
use flate2::read::GzDecoder;
use memmap2::Mmap;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;

/// Byte offset relative to the start of the database buffer
pub type Offset = usize;

/// Storage for database data - either owned or memory-mapped
enum Storage {
    Owned(Vec<u8>),
    Mmap(Mmap),
}

impl Storage {
    fn as_slice(&self) -> &[u8] {
        match self {
            Storage::Owned(v) => v.as_slice(),
            Storage::Mmap(m) => &m[..],
        }
    }
}

/// Immutable database bytes with bounds-checked little-endian reads.
pub struct DatabaseBuffer {
    storage: Storage,
}

impl DatabaseBuffer {
    /// Load an entire database file into memory.
    ///
    /// Files ending in `.gz` (case-insensitive) are decompressed while loading.
    ///
    /// # Errors
    ///
    /// Returns [`LocationError::Load`] if the file cannot be statted, opened,
    /// or read in full.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let load_err = |source: io::Error| LocationError::Load {
            path: path.to_path_buf(),
            source,
        };

        let meta = fs::metadata(path).map_err(load_err)?;
        let file = File::open(path).map_err(load_err)?;

        let is_gzip = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("gz"))
            .unwrap_or(false);

        let data = if is_gzip {
            let mut data = Vec::new();
            GzDecoder::new(file)
                .read_to_end(&mut data)
                .map_err(load_err)?;
            data
        } else {
            let expected = meta.len();
            let mut data = Vec::with_capacity(expected as usize);
            file.take(expected)
                .read_to_end(&mut data)
                .map_err(load_err)?;
            if data.len() as u64 != expected {
                return Err(load_err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("read {} of {} bytes", data.len(), expected),
                )));
            }
            data
        };

        tracing::debug!(path = %path.display(), bytes = data.len(), "loaded database");
        Ok(Self {
            storage: Storage::Owned(data),
        })
    }

    /// Memory-map a database file read-only instead of copying it.
    pub fn open_mmap<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let load_err = |source: io::Error| LocationError::Load {
            path: path.to_path_buf(),
            source,
        };

        let file = File::open(path).map_err(load_err)?;
        // SAFETY: the map is read-only and never handed out with a longer
        // lifetime than `self`.
        let mmap = unsafe { Mmap::map(&file) }.map_err(load_err)?;

        tracing::debug!(path = %path.display(), bytes = mmap.len(), "mapped database");
        Ok(Self {
            storage: Storage::Mmap(mmap),
        })
    }

    /// Wrap an in-memory database image.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self {
            storage: Storage::Owned(data),
        }
    }

    /// Size of the buffer in bytes.
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// True if the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if the buffer is backed by a memory map.
    pub fn is_mapped(&self) -> bool {
        matches!(self.storage, Storage::Mmap(_))
    }

    /// The whole buffer.
    pub fn as_slice(&self) -> &[u8] {
        self.storage.as_slice()
    }

    /// Get a slice at a specific offset with bounds checking.
    ///
    /// Returns `None` if the offset + length would exceed the buffer size.
    pub fn get_slice(&self, offset: Offset, length: usize) -> Option<&[u8]> {
        let end = offset.checked_add(length)?;
        self.as_slice().get(offset..end)
    }

    /// Read `width` (at most 4) bytes at `offset` as a little-endian unsigned integer.
    pub fn read_uint(&self, offset: Offset, width: usize) -> Result<u32> {
        if width > 4 {
            return Err(LocationError::Decode(format!(
                "integer width {} exceeds 4 bytes",
                width
            )));
        }

        let bytes = self
            .get_slice(offset, width)
            .ok_or(LocationError::OutOfBounds {
                offset,
                width,
                len: self.len(),
            })?;

        Ok(bytes
            .iter()
            .enumerate()
            .fold(0u32, |sum, (i, &b)| sum | ((b as u32) << (8 * i))))
    }

    /// Read a single byte.
    #[inline]
    pub fn read_u8(&self, offset: Offset) -> Result<u8> {
        self.read_uint(offset, 1).map(|v| v as u8)
    }

    /// Read a 3-byte little-endian offset.
    #[inline]
    pub fn read_u24(&self, offset: Offset) -> Result<u32> {
        self.read_uint(offset, 3)
    }

    /// Read a 4-byte little-endian integer.
    #[inline]
    pub fn read_u32(&self, offset: Offset) -> Result<u32> {
        self.read_uint(offset, 4)
    }

    /// Read the bytes from `offset` up to, not including, the next NUL.
    ///
    /// Fails with [`LocationError::OutOfBounds`] when `offset` lies outside the
    /// buffer or the string runs to the end without a terminator.
    pub fn read_cstring(&self, offset: Offset) -> Result<&[u8]> {
        let data = self.as_slice();
        let out_of_bounds = LocationError::OutOfBounds {
            offset,
            width: 0,
            len: data.len(),
        };

        let tail = data.get(offset..).ok_or(out_of_bounds)?;
        match memchr::memchr(0, tail) {
            Some(nul) => Ok(&tail[..nul]),
            None => Err(LocationError::OutOfBounds {
                offset,
                width: tail.len(),
                len: data.len(),
            }),
        }
    }
}

impl fmt::Debug for DatabaseBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseBuffer")
            .field("len", &self.len())
            .field("mapped", &self.is_mapped())
            .finish()
    }
}

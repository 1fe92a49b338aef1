//! Database API
//!
//! [`Database`] owns one loaded buffer and answers lookups against it. It is
//! immutable after construction and `Send + Sync`, so a single load can serve
//! any number of threads or requests.
//!
//! # Examples
//!
//! ```no_run
//! use iplocation::Database;
//!
//! let db = Database::open("qqwry.dat")?;
//! let location = db.lookup("1.2.4.8")?;
//! println!("{}", location);
//!
//! // Configured load: memory-mapped, tighter redirect cap
//! let db = Database::from("qqwry.dat")
//!     .mmap(true)
//!     .max_redirect_depth(2)
//!     .open()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::buffer::DatabaseBuffer;
use crate::error::{LocationError, Result};
use crate::index::{IndexEntry, IndexHeader, IndexSearcher};
use crate::record::{RawLocation, RecordResolver, DEFAULT_MAX_DEPTH};
use crate::transcode::{Gb18030Transcoder, Transcoder, DEFAULT_OUTPUT_CAPACITY};
use serde::Serialize;
use std::fmt;
use std::net::Ipv4Addr;
use std::path::PathBuf;

/// A decoded location
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    /// Country (or the database's top-level place name)
    pub country: String,
    /// Area within the country, `"Unknown"` when the database has none
    pub area: String,
}

impl Location {
    /// Transcode a raw location.
    ///
    /// The joined `"<country> <area>"` line is converted as one unit, so the
    /// transcoder's capacity bounds the whole line.
    pub fn decode(raw: &RawLocation, transcoder: &dyn Transcoder) -> Result<Self> {
        let line = transcoder.transcode(&raw.joined())?;
        let country = transcoder.transcode(&raw.country)?;

        let area = line
            .strip_prefix(country.as_str())
            .and_then(|rest| rest.strip_prefix(' '))
            .ok_or_else(|| {
                LocationError::Encoding("country does not decode as a prefix of the line".into())
            })?;

        Ok(Self {
            area: area.to_string(),
            country,
        })
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.country, self.area)
    }
}

/// Options used when opening a database
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    /// Path to the database file
    pub path: PathBuf,
    /// In-memory image, used instead of `path` when set
    pub bytes: Option<Vec<u8>>,
    /// Memory-map the file instead of reading it
    pub mmap: bool,
    /// Maximum pointer hops per string
    pub max_redirect_depth: usize,
    /// Maximum UTF-8 size of a `"<country> <area>"` line
    pub output_capacity: usize,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            bytes: None,
            mmap: false,
            max_redirect_depth: DEFAULT_MAX_DEPTH,
            output_capacity: DEFAULT_OUTPUT_CAPACITY,
        }
    }
}

/// Fluent builder returned by [`Database::from`]
#[derive(Debug, Clone)]
pub struct DatabaseOpener {
    options: DatabaseOptions,
}

impl DatabaseOpener {
    fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            options: DatabaseOptions {
                path: path.into(),
                ..Default::default()
            },
        }
    }

    fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            options: DatabaseOptions {
                bytes: Some(bytes),
                ..Default::default()
            },
        }
    }

    /// Memory-map the file instead of reading it into memory (default off).
    ///
    /// A mapped database reflects later writes to the file, and truncating
    /// the file under it faults the process. Ignored for `.gz` files and
    /// in-memory images.
    pub fn mmap(mut self, enabled: bool) -> Self {
        self.options.mmap = enabled;
        self
    }

    /// Cap on pointer hops per string (default 4)
    pub fn max_redirect_depth(mut self, depth: usize) -> Self {
        self.options.max_redirect_depth = depth;
        self
    }

    /// Maximum UTF-8 output size of one location line (default 512 bytes)
    pub fn output_capacity(mut self, capacity: usize) -> Self {
        self.options.output_capacity = capacity;
        self
    }

    /// Load the database
    pub fn open(self) -> Result<Database> {
        Database::with_options(self.options)
    }
}

/// Loaded geo-IP database
pub struct Database {
    buffer: DatabaseBuffer,
    header: IndexHeader,
    max_depth: usize,
    transcoder: Gb18030Transcoder,
}

impl Database {
    /// Read a whole database file into memory with default options
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Self::from(path).open()
    }

    /// Create a database from raw bytes with default options
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::from_bytes_builder(data).open()
    }

    /// Start configuring a database loaded from `path`
    pub fn from(path: impl Into<PathBuf>) -> DatabaseOpener {
        DatabaseOpener::new(path)
    }

    /// Start configuring a database over an in-memory image
    pub fn from_bytes_builder(bytes: Vec<u8>) -> DatabaseOpener {
        DatabaseOpener::from_bytes(bytes)
    }

    /// Load a database from explicit options
    pub fn with_options(options: DatabaseOptions) -> Result<Self> {
        let buffer = match options.bytes {
            Some(bytes) => DatabaseBuffer::from_bytes(bytes),
            None => {
                let is_gzip = options
                    .path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| ext.eq_ignore_ascii_case("gz"))
                    .unwrap_or(false);
                if options.mmap && !is_gzip {
                    DatabaseBuffer::open_mmap(&options.path)?
                } else {
                    DatabaseBuffer::open(&options.path)?
                }
            }
        };

        let header = IndexHeader::from_buffer(&buffer)?;
        tracing::debug!(
            entries = header.entry_count(),
            index_start = header.index_start,
            index_end = header.index_end,
            "opened database"
        );

        Ok(Self {
            buffer,
            header,
            max_depth: options.max_redirect_depth,
            transcoder: Gb18030Transcoder::with_capacity(options.output_capacity),
        })
    }

    /// Look up a dotted-decimal IPv4 address
    pub fn lookup(&self, query: &str) -> Result<Location> {
        let addr = parse_ipv4(query)?;
        self.lookup_ip(addr)
    }

    /// Look up an IPv4 address
    pub fn lookup_ip(&self, addr: Ipv4Addr) -> Result<Location> {
        let raw = self.lookup_raw(u32::from(addr))?;
        self.decode(&raw)
    }

    /// Look up an address and return the undecoded strings
    pub fn lookup_raw(&self, ip: u32) -> Result<RawLocation> {
        let offset = self.searcher().find_offset(ip)?;
        tracing::trace!(ip, offset, "resolving record");
        self.resolver().resolve(offset)
    }

    /// Index of the entry whose range contains `ip`
    pub fn find_entry(&self, ip: u32) -> Result<usize> {
        self.searcher().find_entry(ip)
    }

    /// Entry `index` of the IP index
    pub fn entry(&self, index: usize) -> Result<IndexEntry> {
        self.searcher().entry(index)
    }

    /// First and last address of entry `index`
    pub fn range(&self, index: usize) -> Result<(Ipv4Addr, Ipv4Addr)> {
        let searcher = self.searcher();
        let entry = searcher.entry(index)?;
        let end = searcher.end_ip(&entry)?;
        Ok((Ipv4Addr::from(entry.start_ip), Ipv4Addr::from(end)))
    }

    /// Location of entry `index`
    pub fn locate_entry(&self, index: usize) -> Result<Location> {
        let entry = self.entry(index)?;
        let raw = self.resolver().resolve(entry.record_offset)?;
        self.decode(&raw)
    }

    /// Location stored under the last index entry.
    ///
    /// Distributed databases use this slot for the data vintage, e.g.
    /// `"纯真网络 2024年10月09日IP数据"`.
    pub fn version(&self) -> Result<Location> {
        self.locate_entry(self.entry_count() - 1)
    }

    /// Transcode a raw location with this database's capacity
    pub fn decode(&self, raw: &RawLocation) -> Result<Location> {
        Location::decode(raw, &self.transcoder)
    }

    /// Number of index entries
    pub fn entry_count(&self) -> usize {
        self.header.entry_count()
    }

    /// Parsed file header
    pub fn header(&self) -> &IndexHeader {
        &self.header
    }

    /// Byte offsets of the first and last index entry
    pub fn index_range(&self) -> (u32, u32) {
        (self.header.index_start, self.header.index_end)
    }

    /// Size of the database in bytes
    pub fn size(&self) -> usize {
        self.buffer.len()
    }

    /// Maximum pointer hops per string
    pub fn max_redirect_depth(&self) -> usize {
        self.max_depth
    }

    /// Underlying buffer
    pub fn buffer(&self) -> &DatabaseBuffer {
        &self.buffer
    }

    /// Index searcher over this database
    pub fn searcher(&self) -> IndexSearcher<'_> {
        IndexSearcher::new(&self.buffer, &self.header)
    }

    /// Record resolver over this database
    pub fn resolver(&self) -> RecordResolver<'_> {
        RecordResolver::with_max_depth(&self.buffer, self.max_depth)
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("buffer", &self.buffer)
            .field("header", &self.header)
            .field("max_depth", &self.max_depth)
            .finish()
    }
}

/// Parse a dotted-decimal IPv4 address, ignoring surrounding whitespace
pub fn parse_ipv4(query: &str) -> Result<Ipv4Addr> {
    query
        .trim()
        .parse::<Ipv4Addr>()
        .map_err(|_| LocationError::InvalidAddress(query.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::DatabaseBuilder;

    fn sample() -> Database {
        let mut builder = DatabaseBuilder::new();
        builder
            .add_range("0.0.0.0", "9.255.255.255", "IANA", "保留地址")
            .unwrap();
        builder
            .add_range("10.0.0.0", "10.255.255.255", "局域网", "")
            .unwrap();
        builder
            .add_range("11.0.0.0", "255.255.255.255", "纯真网络", "2024年10月09日IP数据")
            .unwrap();
        Database::from_bytes(builder.build().unwrap()).unwrap()
    }

    #[test]
    fn test_lookup() {
        let db = sample();
        let loc = db.lookup("10.1.2.3").unwrap();
        assert_eq!(loc.country, "局域网");
        assert_eq!(loc.area, "Unknown");
        assert_eq!(loc.to_string(), "局域网 Unknown");

        assert_eq!(db.lookup("9.255.255.255").unwrap().area, "保留地址");
    }

    #[test]
    fn test_invalid_address() {
        let db = sample();
        for bad in ["", "10.0.0", "10.0.0.256", "::1", "example.com", "1.2.3.4.5"] {
            assert!(
                matches!(db.lookup(bad), Err(LocationError::InvalidAddress(_))),
                "{:?} should be rejected",
                bad
            );
        }
        assert!(db.lookup(" 10.0.0.1\n").is_ok());
    }

    #[test]
    fn test_version_and_ranges() {
        let db = sample();
        assert_eq!(db.entry_count(), 3);
        assert_eq!(db.version().unwrap().area, "2024年10月09日IP数据");

        let (start, end) = db.range(1).unwrap();
        assert_eq!(start, Ipv4Addr::new(10, 0, 0, 0));
        assert_eq!(end, Ipv4Addr::new(10, 255, 255, 255));
    }

    #[test]
    fn test_output_capacity() {
        let mut builder = DatabaseBuilder::new();
        builder
            .add_range("0.0.0.0", "255.255.255.255", "CN", "Beijing Haidian District")
            .unwrap();
        let bytes = builder.build().unwrap();

        let db = Database::from_bytes_builder(bytes.clone())
            .output_capacity(16)
            .open()
            .unwrap();
        assert!(matches!(
            db.lookup("1.1.1.1"),
            Err(LocationError::Encoding(_))
        ));

        let db = Database::from_bytes(bytes).unwrap();
        assert_eq!(
            db.lookup("1.1.1.1").unwrap().to_string(),
            "CN Beijing Haidian District"
        );
    }

    #[test]
    fn test_errors_leave_database_usable() {
        let db = sample();
        assert!(db.lookup("bogus").is_err());
        assert!(db.locate_entry(99).is_err());
        assert_eq!(db.lookup("10.0.0.1").unwrap().country, "局域网");
    }

    #[test]
    fn test_corrupt_record_fails_only_its_lookup() {
        let mut builder = DatabaseBuilder::new();
        builder
            .add_range("0.0.0.0", "9.255.255.255", "IANA", "保留地址")
            .unwrap();
        builder
            .add_range("10.0.0.0", "255.255.255.255", "局域网", "")
            .unwrap();
        let mut bytes = builder.build().unwrap();

        // first record redirects past the end of the buffer
        bytes[12] = 0x01;
        bytes[13..16].copy_from_slice(&[0xFF, 0xFF, 0x7F]);
        let db = Database::from_bytes(bytes).unwrap();

        let err = db.lookup("1.2.3.4").unwrap_err();
        assert!(err.is_decode_error(), "got {:?}", err);
        assert_eq!(db.lookup("10.0.0.1").unwrap().to_string(), "局域网 Unknown");
        assert!(db.lookup("0.0.0.0").is_err());
        assert_eq!(db.lookup("255.255.255.255").unwrap().country, "局域网");
    }

    #[test]
    fn test_database_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Database>();
    }

    #[test]
    fn test_with_options() {
        let mut builder = DatabaseBuilder::new();
        builder.add_raw_range(0, u32::MAX, "CN", "Beijing").unwrap();
        let db = Database::with_options(DatabaseOptions {
            bytes: Some(builder.build().unwrap()),
            max_redirect_depth: 1,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(db.max_redirect_depth(), 1);
        assert_eq!(db.lookup("8.8.8.8").unwrap().to_string(), "CN Beijing");
        assert!(!DatabaseOptions::default().mmap);
    }

    #[test]
    fn test_open_missing_file() {
        assert!(matches!(
            Database::open("/nonexistent/qqwry.dat"),
            Err(LocationError::Load { .. })
        ));
    }
}

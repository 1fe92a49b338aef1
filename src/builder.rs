//! Database builder
//!
//! Writes databases in the same layout the reader decodes. Repeated strings
//! are stored once and referenced:
//!
//! - a repeated (country, area) pair becomes a mode `0x01` redirect to the
//!   first record's block, which is a double redirect when that block itself
//!   starts with a country pointer;
//! - a repeated country becomes a mode `0x02` country pointer;
//! - a repeated area becomes an indirect area reference;
//! - an empty area becomes an indirect reference to offset 0, read back as
//!   `"Unknown"`.
//!
//! # Example
//!
//! ```
//! use iplocation::{Database, DatabaseBuilder};
//!
//! let mut builder = DatabaseBuilder::new();
//! builder.add_range("1.0.0.0", "1.0.0.255", "澳大利亚", "APNIC")?;
//! builder.add_range("1.0.1.0", "255.255.255.255", "中国", "福建省")?;
//!
//! let db = Database::from_bytes(builder.build()?)?;
//! assert_eq!(db.lookup("1.0.0.8")?.to_string(), "澳大利亚 APNIC");
//! # Ok::<(), iplocation::LocationError>(())
//! ```

use crate::database::parse_ipv4;
use crate::error::{LocationError, Result};
use crate::index::{HEADER_SIZE, INDEX_ENTRY_SIZE};
use crate::record::{MODE_REDIRECT, MODE_REDIRECT_COUNTRY};
use crate::transcode::encode_gb18030;
use std::collections::HashMap;

/// Largest offset a 3-byte pointer can hold
const MAX_POINTER: usize = 0x00FF_FFFF;

#[derive(Debug, Clone)]
struct RangeEntry {
    start: u32,
    end: u32,
    country: Vec<u8>,
    area: Vec<u8>,
}

/// Builder for geo-IP database images
#[derive(Debug, Default, Clone)]
pub struct DatabaseBuilder {
    ranges: Vec<RangeEntry>,
}

impl DatabaseBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an inclusive address range with UTF-8 country and area names.
    ///
    /// Names are stored as GB18030. An empty `area` is stored as unknown.
    pub fn add_range(&mut self, start: &str, end: &str, country: &str, area: &str) -> Result<()> {
        let start = u32::from(parse_ipv4(start)?);
        let end = u32::from(parse_ipv4(end)?);
        self.add_raw_range(start, end, encode_gb18030(country)?, encode_gb18030(area)?)
    }

    /// Add an inclusive address range with names already in GB18030.
    pub fn add_raw_range(
        &mut self,
        start: u32,
        end: u32,
        country: impl Into<Vec<u8>>,
        area: impl Into<Vec<u8>>,
    ) -> Result<()> {
        if start > end {
            return Err(LocationError::InvalidAddress(format!(
                "range start {} is after end {}",
                std::net::Ipv4Addr::from(start),
                std::net::Ipv4Addr::from(end)
            )));
        }

        let country = country.into();
        let area = area.into();
        check_string("country", &country)?;
        check_string("area", &area)?;

        self.ranges.push(RangeEntry {
            start,
            end,
            country,
            area,
        });
        Ok(())
    }

    /// Number of ranges added so far
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// True if no ranges were added
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Serialize the database
    pub fn build(&self) -> Result<Vec<u8>> {
        if self.ranges.is_empty() {
            return Err(LocationError::Build(
                "database needs at least one range".to_string(),
            ));
        }

        let mut ranges: Vec<&RangeEntry> = self.ranges.iter().collect();
        ranges.sort_by_key(|r| r.start);
        for pair in ranges.windows(2) {
            if pair[1].start <= pair[0].end {
                return Err(LocationError::Build(format!(
                    "range starting at {} overlaps range starting at {}",
                    std::net::Ipv4Addr::from(pair[1].start),
                    std::net::Ipv4Addr::from(pair[0].start)
                )));
            }
        }

        let mut out = vec![0u8; HEADER_SIZE];
        let mut countries: HashMap<&[u8], u32> = HashMap::new();
        let mut areas: HashMap<&[u8], u32> = HashMap::new();
        let mut blocks: HashMap<(&[u8], &[u8]), u32> = HashMap::new();
        let mut index = Vec::with_capacity(ranges.len());

        for range in &ranges {
            let record = pointer(out.len())?;
            index.push((range.start, record));
            out.extend_from_slice(&range.end.to_le_bytes());

            let key = (range.country.as_slice(), range.area.as_slice());
            if let Some(&block) = blocks.get(&key) {
                out.push(MODE_REDIRECT);
                put_u24(&mut out, block);
                continue;
            }

            let block = pointer(out.len())?;
            match countries.get(range.country.as_slice()) {
                Some(&country) => {
                    out.push(MODE_REDIRECT_COUNTRY);
                    put_u24(&mut out, country);
                }
                None => {
                    countries.insert(&range.country, block);
                    out.extend_from_slice(&range.country);
                    out.push(0);
                }
            }

            if range.area.is_empty() {
                out.push(MODE_REDIRECT_COUNTRY);
                put_u24(&mut out, 0);
            } else if let Some(&area) = areas.get(range.area.as_slice()) {
                out.push(MODE_REDIRECT_COUNTRY);
                put_u24(&mut out, area);
            } else {
                areas.insert(&range.area, pointer(out.len())?);
                out.extend_from_slice(&range.area);
                out.push(0);
            }

            blocks.insert(key, block);
        }

        let index_start = header_offset(out.len())?;
        for (start, record) in &index {
            out.extend_from_slice(&start.to_le_bytes());
            put_u24(&mut out, *record);
        }
        let index_end = header_offset(out.len() - INDEX_ENTRY_SIZE)?;

        out[0..4].copy_from_slice(&index_start.to_le_bytes());
        out[4..8].copy_from_slice(&index_end.to_le_bytes());

        tracing::debug!(
            ranges = ranges.len(),
            countries = countries.len(),
            areas = areas.len(),
            bytes = out.len(),
            "built database"
        );
        Ok(out)
    }
}

/// Strings are NUL-terminated and must not look like a mode byte
fn check_string(field: &str, value: &[u8]) -> Result<()> {
    if value.contains(&0) {
        return Err(LocationError::Build(format!("{} contains a NUL byte", field)));
    }
    if matches!(value.first(), Some(&MODE_REDIRECT) | Some(&MODE_REDIRECT_COUNTRY)) {
        return Err(LocationError::Build(format!(
            "{} may not start with byte 0x{:02x}",
            field, value[0]
        )));
    }
    Ok(())
}

fn pointer(offset: usize) -> Result<u32> {
    if offset > MAX_POINTER {
        return Err(LocationError::Build(format!(
            "offset {} does not fit in a 3-byte pointer",
            offset
        )));
    }
    Ok(offset as u32)
}

fn header_offset(offset: usize) -> Result<u32> {
    u32::try_from(offset)
        .map_err(|_| LocationError::Build(format!("index offset {} exceeds 4 GiB", offset)))
}

fn put_u24(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes()[..3]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::DatabaseBuffer;
    use crate::database::Database;
    use crate::index::IndexHeader;
    use crate::record::{RecordMode, RecordResolver};

    #[test]
    fn test_empty_builder_fails() {
        let builder = DatabaseBuilder::new();
        assert!(builder.is_empty());
        assert!(matches!(builder.build(), Err(LocationError::Build(_))));
    }

    #[test]
    fn test_header_layout() {
        let mut builder = DatabaseBuilder::new();
        builder.add_raw_range(0, 99, "A", "a").unwrap();
        builder.add_raw_range(100, u32::MAX, "B", "b").unwrap();
        let bytes = builder.build().unwrap();

        let buf = DatabaseBuffer::from_bytes(bytes.clone());
        let header = IndexHeader::from_buffer(&buf).unwrap();
        assert_eq!(header.entry_count(), 2);
        assert_eq!(header.index_end as usize, bytes.len() - INDEX_ENTRY_SIZE);
        // first record directly follows the header
        assert_eq!(buf.read_u24(header.index_start as usize + 4).unwrap(), 8);
        assert_eq!(buf.read_u32(8).unwrap(), 99);
    }

    #[test]
    fn test_rejects_bad_ranges() {
        let mut builder = DatabaseBuilder::new();
        assert!(builder.add_raw_range(10, 5, "A", "a").is_err());
        assert!(builder.add_range("1.2.3", "1.2.3.4", "A", "a").is_err());

        builder.add_raw_range(0, 10, "A", "a").unwrap();
        builder.add_raw_range(10, 20, "B", "b").unwrap();
        assert!(matches!(builder.build(), Err(LocationError::Build(_))));
    }

    #[test]
    fn test_rejects_unrepresentable_strings() {
        let mut builder = DatabaseBuilder::new();
        assert!(builder.add_raw_range(0, 1, b"C\0N".to_vec(), "a").is_err());
        assert!(builder.add_raw_range(0, 1, vec![0x02, b'X'], "a").is_err());
        assert!(builder.add_raw_range(0, 1, "CN", vec![0x01]).is_err());
        assert_eq!(builder.len(), 0);
    }

    #[test]
    fn test_deduplication_modes() {
        let mut builder = DatabaseBuilder::new();
        // inline country + inline area
        builder.add_raw_range(0, 9, "CN", "Beijing").unwrap();
        // repeated country, new area -> mode 0x02
        builder.add_raw_range(10, 19, "CN", "Shanghai").unwrap();
        // repeated pair of an inline block -> mode 0x01
        builder.add_raw_range(20, 29, "CN", "Beijing").unwrap();
        // repeated pair of a 0x02 block -> mode 0x01 then 0x02
        builder.add_raw_range(30, u32::MAX, "CN", "Shanghai").unwrap();
        let bytes = builder.build().unwrap();

        let db = Database::from_bytes(bytes).unwrap();
        let buf = db.buffer();
        let resolver = RecordResolver::new(buf);

        let modes: Vec<RecordMode> = (0..4)
            .map(|i| resolver.mode(db.entry(i).unwrap().record_offset).unwrap())
            .collect();
        assert_eq!(modes[0], RecordMode::Inline);
        assert!(matches!(modes[1], RecordMode::RedirectedCountry { .. }));
        let RecordMode::Redirect { target } = modes[3] else {
            panic!("expected redirect, got {:?}", modes[3]);
        };
        assert!(matches!(
            RecordMode::read(buf, target as usize, true).unwrap(),
            RecordMode::DoubleRedirect { .. }
        ));

        let raw = db.lookup_raw(35).unwrap();
        assert_eq!(raw.country, b"CN");
        assert_eq!(raw.area, b"Shanghai");
        assert_eq!(raw.hops, 2);
        assert_eq!(db.lookup_raw(25).unwrap().area, b"Beijing");
    }

    #[test]
    fn test_repeated_area_is_indirect() {
        let mut builder = DatabaseBuilder::new();
        builder.add_raw_range(0, 9, "US", "Cloudflare").unwrap();
        builder.add_raw_range(10, u32::MAX, "AU", "Cloudflare").unwrap();
        let bytes = builder.build().unwrap();

        // the area string is stored once
        let needle = b"Cloudflare";
        let count = bytes.windows(needle.len()).filter(|w| w == needle).count();
        assert_eq!(count, 1);

        let db = Database::from_bytes(bytes).unwrap();
        let raw = db.lookup_raw(10).unwrap();
        assert_eq!(raw.country, b"AU");
        assert_eq!(raw.area, b"Cloudflare");
        assert_eq!(raw.hops, 1);
    }

    #[test]
    fn test_unsorted_input_is_sorted() {
        let mut builder = DatabaseBuilder::new();
        builder.add_raw_range(100, u32::MAX, "B", "b").unwrap();
        builder.add_raw_range(0, 99, "A", "a").unwrap();
        let db = Database::from_bytes(builder.build().unwrap()).unwrap();
        assert_eq!(db.entry(0).unwrap().start_ip, 0);
        assert_eq!(db.lookup_raw(50).unwrap().country, b"A");
        assert_eq!(db.lookup_raw(100).unwrap().country, b"B");
    }
}

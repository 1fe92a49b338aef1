//! Location record decoding.
//!
//! A record starts with the range's last address (4 bytes) followed by a mode
//! byte that says where the country and area strings live:
//!
//! ```text
//! mode 0x01   [end_ip][01][u24 target] ──► target block (may itself be mode 0x02)
//! mode 0x02   [end_ip][02][u24 country][area ref]
//! otherwise   [end_ip][country\0][area ref]
//! ```
//!
//! The area reference that follows the country is either an inline string or
//! a `0x01`/`0x02` byte plus a 3-byte offset. An indirect area pointing at
//! offset 0 means the area is unknown.
//!
//! Every pointer followed counts as one hop. A resolver refuses to follow more
//! than `max_depth` hops along either string's path; a well-formed record needs
//! at most two.

use crate::buffer::{DatabaseBuffer, Offset};
use crate::error::{LocationError, Result};

/// Mode byte: the rest of the record lives at a 3-byte offset
pub const MODE_REDIRECT: u8 = 0x01;

/// Mode byte: the country lives at a 3-byte offset, the area reference follows
pub const MODE_REDIRECT_COUNTRY: u8 = 0x02;

/// Area substituted when an indirect area reference points at offset 0
pub const AREA_UNKNOWN: &[u8] = b"Unknown";

/// Default cap on pointer hops per string
pub const DEFAULT_MAX_DEPTH: usize = 4;

/// How the country part of a record block is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordMode {
    /// Country string starts at the mode byte's position
    Inline,
    /// Mode `0x01` in a record: the block continues at `target`
    Redirect {
        /// Offset of the redirect target block
        target: u32,
    },
    /// Mode `0x02` in a record: country at `country`, area reference after the pointer
    RedirectedCountry {
        /// Offset of the country string
        country: u32,
    },
    /// Mode `0x02` at a redirect target
    DoubleRedirect {
        /// Offset of the country string
        country: u32,
    },
}

impl RecordMode {
    /// Classify the block at `pos`.
    ///
    /// Redirect targets only recognise `0x02`; any other byte there starts an
    /// inline country string.
    pub fn read(buffer: &DatabaseBuffer, pos: Offset, at_target: bool) -> Result<Self> {
        let mode = buffer.read_u8(pos)?;
        Ok(match (mode, at_target) {
            (MODE_REDIRECT, false) => RecordMode::Redirect {
                target: buffer.read_u24(pos + 1)?,
            },
            (MODE_REDIRECT_COUNTRY, false) => RecordMode::RedirectedCountry {
                country: buffer.read_u24(pos + 1)?,
            },
            (MODE_REDIRECT_COUNTRY, true) => RecordMode::DoubleRedirect {
                country: buffer.read_u24(pos + 1)?,
            },
            _ => RecordMode::Inline,
        })
    }
}

/// How an area reference is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AreaMode {
    /// `0x01`/`0x02` followed by a 3-byte offset
    Indirect {
        /// Offset of the area string, 0 for unknown
        target: u32,
    },
    /// Area string starts at the reference position
    Inline,
}

impl AreaMode {
    /// Classify the area reference at `pos`
    pub fn read(buffer: &DatabaseBuffer, pos: Offset) -> Result<Self> {
        match buffer.read_u8(pos)? {
            MODE_REDIRECT | MODE_REDIRECT_COUNTRY => Ok(AreaMode::Indirect {
                target: buffer.read_u24(pos + 1)?,
            }),
            _ => Ok(AreaMode::Inline),
        }
    }
}

/// Undecoded country and area bytes in the database's legacy encoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLocation {
    /// Country bytes
    pub country: Vec<u8>,
    /// Area bytes
    pub area: Vec<u8>,
    /// Most pointer hops taken by either string
    pub hops: usize,
}

impl RawLocation {
    /// `"<country> <area>"`, still in the legacy encoding
    pub fn joined(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.country.len() + 1 + self.area.len());
        out.extend_from_slice(&self.country);
        out.push(b' ');
        out.extend_from_slice(&self.area);
        out
    }

    /// True if the area came from an offset-0 reference
    pub fn area_is_unknown(&self) -> bool {
        self.area == AREA_UNKNOWN
    }
}

/// Follows record indirection to the raw country and area strings
pub struct RecordResolver<'a> {
    buffer: &'a DatabaseBuffer,
    max_depth: usize,
}

impl<'a> RecordResolver<'a> {
    /// Create a resolver with the default hop cap
    pub fn new(buffer: &'a DatabaseBuffer) -> Self {
        Self::with_max_depth(buffer, DEFAULT_MAX_DEPTH)
    }

    /// Create a resolver that follows at most `max_depth` hops per string
    pub fn with_max_depth(buffer: &'a DatabaseBuffer, max_depth: usize) -> Self {
        Self { buffer, max_depth }
    }

    /// Resolve the record at `record_offset`
    pub fn resolve(&self, record_offset: u32) -> Result<RawLocation> {
        self.resolve_block(record_offset as Offset + 4, false, 0)
    }

    /// Mode of the record at `record_offset`
    pub fn mode(&self, record_offset: u32) -> Result<RecordMode> {
        RecordMode::read(self.buffer, record_offset as Offset + 4, false)
    }

    fn resolve_block(&self, pos: Offset, at_target: bool, hops: usize) -> Result<RawLocation> {
        match RecordMode::read(self.buffer, pos, at_target)? {
            RecordMode::Redirect { target } => {
                let hops = self.hop(hops, pos)?;
                self.resolve_block(target as Offset, true, hops)
            }
            RecordMode::RedirectedCountry { country } | RecordMode::DoubleRedirect { country } => {
                let country_hops = self.hop(hops, pos)?;
                let country = self.buffer.read_cstring(country as Offset)?.to_vec();
                let (area, area_hops) = self.resolve_area(pos + 4, hops)?;
                Ok(RawLocation {
                    country,
                    area,
                    hops: country_hops.max(area_hops),
                })
            }
            RecordMode::Inline => {
                let country = self.buffer.read_cstring(pos)?.to_vec();
                let (area, area_hops) = self.resolve_area(pos + country.len() + 1, hops)?;
                Ok(RawLocation {
                    country,
                    area,
                    hops: area_hops,
                })
            }
        }
    }

    /// Resolve the area reference at `pos`, returning the bytes and hop count
    fn resolve_area(&self, pos: Offset, hops: usize) -> Result<(Vec<u8>, usize)> {
        match AreaMode::read(self.buffer, pos)? {
            AreaMode::Indirect { target } => {
                let hops = self.hop(hops, pos)?;
                if target == 0 {
                    return Ok((AREA_UNKNOWN.to_vec(), hops));
                }
                let area = self.buffer.read_cstring(target as Offset)?;
                Ok((area.to_vec(), hops))
            }
            AreaMode::Inline => Ok((self.buffer.read_cstring(pos)?.to_vec(), hops)),
        }
    }

    fn hop(&self, hops: usize, pos: Offset) -> Result<usize> {
        let next = hops + 1;
        if next > self.max_depth {
            return Err(LocationError::Decode(format!(
                "pointer at offset {} exceeds redirect depth {}",
                pos, self.max_depth
            )));
        }
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u24(v: u32) -> [u8; 3] {
        let b = v.to_le_bytes();
        [b[0], b[1], b[2]]
    }

    /// Buffer layout shared by the redirect tests:
    ///
    /// - 0..8     header padding
    /// - 8        "CN\0"            country string
    /// - 11       "Beijing\0"       area string
    fn strings() -> Vec<u8> {
        let mut data = vec![0u8; 8];
        data.extend_from_slice(b"CN\0");
        data.extend_from_slice(b"Beijing\0");
        data
    }

    #[test]
    fn test_inline_record() {
        let mut data = vec![0u8; 4];
        data.extend_from_slice(&[0xFF; 4]);
        data.extend_from_slice(b"CN\0Beijing\0");
        let buf = DatabaseBuffer::from_bytes(data);
        let resolver = RecordResolver::new(&buf);

        let loc = resolver.resolve(4).unwrap();
        assert_eq!(loc.country, b"CN");
        assert_eq!(loc.area, b"Beijing");
        assert_eq!(loc.hops, 0);
        assert_eq!(loc.joined(), b"CN Beijing");
        assert_eq!(resolver.mode(4).unwrap(), RecordMode::Inline);
    }

    #[test]
    fn test_redirected_country_record() {
        let mut data = strings();
        let record = data.len() as u32;
        data.extend_from_slice(&[0xFF; 4]);
        data.push(MODE_REDIRECT_COUNTRY);
        data.extend_from_slice(&u24(8));
        data.extend_from_slice(b"Shanghai\0");
        let buf = DatabaseBuffer::from_bytes(data);
        let resolver = RecordResolver::new(&buf);

        let loc = resolver.resolve(record).unwrap();
        assert_eq!(loc.country, b"CN");
        assert_eq!(loc.area, b"Shanghai");
        assert_eq!(loc.hops, 1);
        assert_eq!(
            resolver.mode(record).unwrap(),
            RecordMode::RedirectedCountry { country: 8 }
        );
    }

    #[test]
    fn test_redirect_to_inline_block() {
        let mut data = strings();
        let target = data.len() as u32;
        data.extend_from_slice(b"US\0");
        data.push(MODE_REDIRECT_COUNTRY);
        data.extend_from_slice(&u24(11));
        let record = data.len() as u32;
        data.extend_from_slice(&[0xFF; 4]);
        data.push(MODE_REDIRECT);
        data.extend_from_slice(&u24(target));
        let buf = DatabaseBuffer::from_bytes(data);

        let loc = RecordResolver::new(&buf).resolve(record).unwrap();
        assert_eq!(loc.country, b"US");
        assert_eq!(loc.area, b"Beijing");
        assert_eq!(loc.hops, 2);
    }

    #[test]
    fn test_double_redirect_takes_two_hops() {
        let mut data = strings();
        let target = data.len() as u32;
        data.push(MODE_REDIRECT_COUNTRY);
        data.extend_from_slice(&u24(8));
        data.extend_from_slice(b"Haidian\0");
        let record = data.len() as u32;
        data.extend_from_slice(&[0xFF; 4]);
        data.push(MODE_REDIRECT);
        data.extend_from_slice(&u24(target));
        let buf = DatabaseBuffer::from_bytes(data);

        let loc = RecordResolver::new(&buf).resolve(record).unwrap();
        assert_eq!(loc.country, b"CN");
        assert_eq!(loc.area, b"Haidian");
        assert_eq!(loc.hops, 2);

        assert!(RecordResolver::with_max_depth(&buf, 2).resolve(record).is_ok());
        assert!(matches!(
            RecordResolver::with_max_depth(&buf, 1).resolve(record),
            Err(LocationError::Decode(_))
        ));
    }

    #[test]
    fn test_redirect_target_with_mode_one_is_inline() {
        // a 0x01 byte at a redirect target is not followed again
        let mut data = strings();
        let target = data.len() as u32;
        data.push(MODE_REDIRECT);
        data.extend_from_slice(b"X\0");
        data.extend_from_slice(b"Y\0");
        let record = data.len() as u32;
        data.extend_from_slice(&[0xFF; 4]);
        data.push(MODE_REDIRECT);
        data.extend_from_slice(&u24(target));
        let buf = DatabaseBuffer::from_bytes(data);

        let loc = RecordResolver::new(&buf).resolve(record).unwrap();
        assert_eq!(loc.country, b"\x01X");
        assert_eq!(loc.area, b"Y");
    }

    #[test]
    fn test_self_redirect_terminates() {
        let mut data = vec![0u8; 8];
        let record = data.len() as u32;
        data.extend_from_slice(&[0xFF; 4]);
        data.push(MODE_REDIRECT);
        // points back at its own mode byte
        data.extend_from_slice(&u24(record + 4));
        data.push(0);
        let buf = DatabaseBuffer::from_bytes(data);

        let loc = RecordResolver::new(&buf).resolve(record).unwrap();
        assert!(loc.hops <= DEFAULT_MAX_DEPTH);
    }

    #[test]
    fn test_unknown_area() {
        let mut data = vec![0u8; 4];
        data.extend_from_slice(&[0xFF; 4]);
        data.extend_from_slice(b"CN\0");
        data.push(MODE_REDIRECT);
        data.extend_from_slice(&u24(0));
        let buf = DatabaseBuffer::from_bytes(data);

        let loc = RecordResolver::new(&buf).resolve(4).unwrap();
        assert_eq!(loc.area, AREA_UNKNOWN);
        assert!(loc.area_is_unknown());
        assert_eq!(loc.joined(), b"CN Unknown");
    }

    #[test]
    fn test_indirect_area_mode_two() {
        let mut data = strings();
        let record = data.len() as u32;
        data.extend_from_slice(&[0xFF; 4]);
        data.extend_from_slice(b"JP\0");
        data.push(MODE_REDIRECT_COUNTRY);
        data.extend_from_slice(&u24(11));
        let buf = DatabaseBuffer::from_bytes(data);

        let loc = RecordResolver::new(&buf).resolve(record).unwrap();
        assert_eq!(loc.country, b"JP");
        assert_eq!(loc.area, b"Beijing");
        assert_eq!(loc.hops, 1);
    }

    #[test]
    fn test_out_of_bounds_pointers() {
        // country pointer past the end
        let mut data = vec![0u8; 4];
        data.extend_from_slice(&[0xFF; 4]);
        data.push(MODE_REDIRECT_COUNTRY);
        data.extend_from_slice(&u24(0x00FF_FFFF));
        data.extend_from_slice(b"area\0");
        let buf = DatabaseBuffer::from_bytes(data);
        assert!(matches!(
            RecordResolver::new(&buf).resolve(4),
            Err(LocationError::OutOfBounds { .. })
        ));

        // area pointer truncated
        let mut data = vec![0u8; 4];
        data.extend_from_slice(&[0xFF; 4]);
        data.extend_from_slice(b"CN\0");
        data.push(MODE_REDIRECT);
        data.push(0x10);
        let buf = DatabaseBuffer::from_bytes(data);
        assert!(RecordResolver::new(&buf).resolve(4).is_err());

        // record offset past the end
        let buf = DatabaseBuffer::from_bytes(vec![0u8; 8]);
        assert!(RecordResolver::new(&buf).resolve(100).is_err());
    }

    #[test]
    fn test_unterminated_country() {
        let mut data = vec![0u8; 4];
        data.extend_from_slice(&[0xFF; 4]);
        data.extend_from_slice(b"CNCNCN");
        let buf = DatabaseBuffer::from_bytes(data);
        assert!(matches!(
            RecordResolver::new(&buf).resolve(4),
            Err(LocationError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_resolve_is_repeatable() {
        let mut data = strings();
        let record = data.len() as u32;
        data.extend_from_slice(&[0xFF; 4]);
        data.push(MODE_REDIRECT_COUNTRY);
        data.extend_from_slice(&u24(8));
        data.push(MODE_REDIRECT_COUNTRY);
        data.extend_from_slice(&u24(11));
        let buf = DatabaseBuffer::from_bytes(data);
        let resolver = RecordResolver::new(&buf);

        let first = resolver.resolve(record).unwrap();
        for _ in 0..10 {
            assert_eq!(resolver.resolve(record).unwrap(), first);
        }
    }
}

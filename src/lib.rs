//! iplocation - IPv4 geolocation from QQWry-format databases
//!
//! Resolves an IPv4 address to a `(country, area)` pair using the compact
//! binary format distributed as `qqwry.dat`: an index of range start
//! addresses sorted ascending, pointing at records whose strings are stored
//! in GB18030 and shared through 3-byte pointers.
//!
//! # Quick Start
//!
//! ```rust
//! use iplocation::{Database, DatabaseBuilder};
//!
//! let mut builder = DatabaseBuilder::new();
//! builder.add_range("0.0.0.0", "9.255.255.255", "IANA", "保留地址")?;
//! builder.add_range("10.0.0.0", "10.255.255.255", "局域网", "")?;
//! builder.add_range("11.0.0.0", "255.255.255.255", "美国", "")?;
//!
//! let db = Database::from_bytes(builder.build()?)?;
//!
//! let location = db.lookup("10.1.2.3")?;
//! assert_eq!(location.country, "局域网");
//! assert_eq!(location.area, "Unknown");
//! # Ok::<(), iplocation::LocationError>(())
//! ```
//!
//! Opening a file on disk reads it into memory. Mapping is opt-in:
//!
//! ```rust,no_run
//! use iplocation::Database;
//!
//! let db = Database::from("qqwry.dat").mmap(true).max_redirect_depth(2).open()?;
//! println!("{}", db.lookup("8.8.8.8")?);
//! # Ok::<(), iplocation::LocationError>(())
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │  header: index_start, index_end      │
//! ├──────────────────────────────────────┤
//! │  records: end_ip + country + area    │
//! │  (strings shared via 3-byte offsets) │
//! ├──────────────────────────────────────┤
//! │  index: 7-byte entries sorted by     │
//! │  start_ip                            │
//! └──────────────────────────────────────┘
//! ```
//!
//! A lookup is a binary search over the index ([`index`]), a walk of the
//! record's pointers ([`record`]), and a GB18030 to UTF-8 conversion
//! ([`transcode`]). Every read is bounds-checked against the
//! [`buffer::DatabaseBuffer`], so a corrupt database yields an error for the
//! affected lookup and nothing else.
//!
//! A [`Database`] is immutable after loading and can be shared across
//! threads without locking.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod buffer;
pub mod builder;
pub mod database;
pub mod error;
pub mod index;
pub mod record;
pub mod transcode;
pub mod validation;

pub use crate::builder::DatabaseBuilder;
pub use crate::database::{parse_ipv4, Database, DatabaseOpener, DatabaseOptions, Location};
pub use crate::error::{LocationError, Result};
pub use crate::record::RawLocation;
pub use crate::transcode::{Gb18030Transcoder, Transcoder};
pub use crate::validation::{validate, ValidationReport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(VERSION.starts_with("0.3"));
    }
}

//! Database validation
//!
//! Walks every index entry of an opened [`Database`] and reports anything a
//! lookup could trip over:
//!
//! - start addresses out of order
//! - ranges whose end precedes their start, or that overlap the next range
//! - records whose pointers leave the buffer or exceed the redirect depth
//! - strings that do not convert to UTF-8
//!
//! Record checks run in parallel. Gaps between ranges are reported as
//! warnings since lookups inside a gap still return a location.
//!
//! # Usage
//!
//! ```rust,no_run
//! use iplocation::validation::validate;
//! use iplocation::Database;
//!
//! let db = Database::open("qqwry.dat")?;
//! let report = validate(&db);
//!
//! if report.is_valid() {
//!     println!("{}", report.stats.summary());
//! } else {
//!     for error in &report.errors {
//!         println!("  - {}", error);
//!     }
//! }
//! # Ok::<(), iplocation::LocationError>(())
//! ```

use crate::database::Database;
use crate::index::IndexEntry;
use crate::record::{RawLocation, RecordMode};
use rayon::prelude::*;
use serde::Serialize;
use std::net::Ipv4Addr;

/// Result of validating a database
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    /// Problems that make lookups fail or return wrong data
    pub errors: Vec<String>,
    /// Suspicious but usable structure
    pub warnings: Vec<String>,
    /// Informational messages
    pub info: Vec<String>,
    /// Counts gathered while validating
    pub stats: DatabaseStats,
}

/// Statistics about a database
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DatabaseStats {
    /// Buffer size in bytes
    pub file_size: usize,
    /// Number of index entries
    pub entry_count: usize,
    /// Offset of the first index entry
    pub index_start: u32,
    /// Offset of the last index entry
    pub index_end: u32,
    /// Records with an inline country
    pub inline_records: usize,
    /// Records redirecting to another block
    pub redirect_records: usize,
    /// Records with a country pointer
    pub country_pointer_records: usize,
    /// Redirect records whose target holds a country pointer
    pub double_redirect_records: usize,
    /// Records whose area is unknown
    pub unknown_areas: usize,
    /// Most pointer hops any record needed
    pub max_hops: usize,
    /// Records that failed to resolve or convert
    pub failed_records: usize,
}

impl ValidationReport {
    fn new() -> Self {
        Self::default()
    }

    /// Check if the database passed all validations (no errors)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    fn warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    fn info(&mut self, msg: impl Into<String>) {
        self.info.push(msg.into());
    }
}

impl DatabaseStats {
    /// Human-readable summary
    pub fn summary(&self) -> String {
        format!(
            "Entries: {}, Records: {} inline, {} redirect ({} double), {} country pointer, Unknown areas: {}, Size: {} KB",
            self.entry_count,
            self.inline_records,
            self.redirect_records,
            self.double_redirect_records,
            self.country_pointer_records,
            self.unknown_areas,
            self.file_size / 1024
        )
    }

    fn record(&mut self, check: &RecordCheck) {
        match check.kind {
            RecordKind::Inline => self.inline_records += 1,
            RecordKind::Redirect => self.redirect_records += 1,
            RecordKind::DoubleRedirect => {
                self.redirect_records += 1;
                self.double_redirect_records += 1;
            }
            RecordKind::CountryPointer => self.country_pointer_records += 1,
        }
        if check.raw.area_is_unknown() {
            self.unknown_areas += 1;
        }
        self.max_hops = self.max_hops.max(check.raw.hops);
    }
}

/// How a record stores its strings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordKind {
    Inline,
    Redirect,
    DoubleRedirect,
    CountryPointer,
}

struct RecordCheck {
    kind: RecordKind,
    raw: RawLocation,
}

/// Validate every entry of `db`
pub fn validate(db: &Database) -> ValidationReport {
    let mut report = ValidationReport::new();
    let header = db.header();

    report.stats.file_size = db.size();
    report.stats.entry_count = db.entry_count();
    report.stats.index_start = header.index_start;
    report.stats.index_end = header.index_end;
    report.info(format!(
        "Index: {} entries at offsets {}..={}",
        db.entry_count(),
        header.index_start,
        header.index_end
    ));

    let entries = match collect_entries(db) {
        Ok(entries) => entries,
        Err(msg) => {
            report.error(msg);
            return report;
        }
    };
    check_ranges(db, &entries, &mut report);

    let checks: Vec<(usize, Result<RecordCheck, String>)> = entries
        .par_iter()
        .enumerate()
        .map(|(i, entry)| (i, check_record(db, entry)))
        .collect();

    for (i, check) in checks {
        match check {
            Ok(check) => report.stats.record(&check),
            Err(msg) => {
                report.stats.failed_records += 1;
                report.error(format!("entry {}: {}", i, msg));
            }
        }
    }

    if let Some(last) = entries.last() {
        match db.locate_entry(entries.len() - 1) {
            Ok(version) => report.info(format!("Version record: {}", version)),
            Err(_) => report.warning(format!(
                "last entry (start {}) has no readable version record",
                Ipv4Addr::from(last.start_ip)
            )),
        }
    }

    for msg in &report.errors {
        tracing::warn!("validation error: {}", msg);
    }
    tracing::debug!(
        errors = report.errors.len(),
        warnings = report.warnings.len(),
        "validation finished"
    );
    report
}

fn collect_entries(db: &Database) -> Result<Vec<IndexEntry>, String> {
    db.searcher()
        .entries()
        .collect::<crate::Result<Vec<_>>>()
        .map_err(|e| format!("index unreadable: {}", e))
}

/// Ordering and overlap checks, which need neighbouring entries
fn check_ranges(db: &Database, entries: &[IndexEntry], report: &mut ValidationReport) {
    let searcher = db.searcher();

    if let Some(first) = entries.first() {
        if first.start_ip != 0 {
            report.warning(format!(
                "addresses below {} are not covered",
                Ipv4Addr::from(first.start_ip)
            ));
        }
    }

    let mut previous: Option<(usize, u32)> = None;
    for (i, entry) in entries.iter().enumerate() {
        let end = match searcher.end_ip(entry) {
            Ok(end) => end,
            Err(e) => {
                // reported again by the record check
                tracing::trace!(entry = i, "unreadable end address: {}", e);
                previous = None;
                continue;
            }
        };

        if end < entry.start_ip {
            report.error(format!(
                "entry {}: end {} precedes start {}",
                i,
                Ipv4Addr::from(end),
                Ipv4Addr::from(entry.start_ip)
            ));
        }

        if i > 0 && entry.start_ip <= entries[i - 1].start_ip {
            report.error(format!(
                "entry {}: start {} is not above previous start {}",
                i,
                Ipv4Addr::from(entry.start_ip),
                Ipv4Addr::from(entries[i - 1].start_ip)
            ));
        }

        if let Some((prev_index, prev_end)) = previous {
            if prev_end >= entry.start_ip {
                report.error(format!(
                    "entry {}: range ending at {} overlaps entry {} starting at {}",
                    prev_index,
                    Ipv4Addr::from(prev_end),
                    i,
                    Ipv4Addr::from(entry.start_ip)
                ));
            } else if prev_end + 1 < entry.start_ip {
                report.warning(format!(
                    "addresses {} - {} are not covered",
                    Ipv4Addr::from(prev_end + 1),
                    Ipv4Addr::from(entry.start_ip - 1)
                ));
            }
        }
        previous = Some((i, end));
    }
}

fn check_record(db: &Database, entry: &IndexEntry) -> Result<RecordCheck, String> {
    let resolver = db.resolver();
    let kind = match resolver.mode(entry.record_offset).map_err(|e| e.to_string())? {
        RecordMode::Inline => RecordKind::Inline,
        RecordMode::RedirectedCountry { .. } => RecordKind::CountryPointer,
        RecordMode::DoubleRedirect { .. } => RecordKind::DoubleRedirect,
        RecordMode::Redirect { target } => {
            match RecordMode::read(db.buffer(), target as usize, true) {
                Ok(RecordMode::DoubleRedirect { .. }) => RecordKind::DoubleRedirect,
                _ => RecordKind::Redirect,
            }
        }
    };

    let raw = resolver
        .resolve(entry.record_offset)
        .map_err(|e| e.to_string())?;
    db.decode(&raw).map_err(|e| e.to_string())?;
    Ok(RecordCheck { kind, raw })
}

//! Error types for the iplocation library
//!
//! Every failure a lookup can hit is a variant of [`LocationError`]. Decode-time
//! errors are raised at the read that would have left the buffer, so they abort
//! the current lookup and nothing else.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for iplocation operations
pub type Result<T> = std::result::Result<T, LocationError>;

/// Main error type for iplocation operations
#[derive(Error, Debug)]
pub enum LocationError {
    /// Database file missing, unreadable, or shorter than its stat size
    #[error("failed to load database {}: {source}", path.display())]
    Load {
        /// Path that was being loaded
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Address string is not a dotted-decimal IPv4 address
    #[error("invalid IPv4 address: {0}")]
    InvalidAddress(String),

    /// A read of `width` bytes at `offset` would leave the buffer
    #[error("read of {width} byte(s) at offset {offset} exceeds buffer length {len}")]
    OutOfBounds {
        /// Offset of the attempted read
        offset: usize,
        /// Number of bytes requested (0 for an unterminated string scan)
        width: usize,
        /// Total buffer length
        len: usize,
    },

    /// Structurally inconsistent header, index or record
    #[error("decode error: {0}")]
    Decode(String),

    /// Legacy-to-UTF-8 conversion failed
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Database construction error
    #[error("build error: {0}")]
    Build(String),
}

impl LocationError {
    /// True for errors raised while decoding an already-loaded buffer
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            LocationError::OutOfBounds { .. } | LocationError::Decode(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_bounds_message() {
        let err = LocationError::OutOfBounds {
            offset: 10,
            width: 4,
            len: 12,
        };
        assert_eq!(
            err.to_string(),
            "read of 4 byte(s) at offset 10 exceeds buffer length 12"
        );
        assert!(err.is_decode_error());
    }

    #[test]
    fn test_load_error_keeps_source() {
        use std::error::Error as _;

        let err = LocationError::Load {
            path: PathBuf::from("/missing/qqwry.dat"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        assert!(err.to_string().contains("/missing/qqwry.dat"));
        assert!(err.source().is_some());
        assert!(!err.is_decode_error());
    }
}

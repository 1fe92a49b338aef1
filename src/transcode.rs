//! GB18030 to UTF-8 conversion for location strings.
//!
//! Database strings are stored in GB18030 (a superset of GB2312). Conversion is
//! all-or-nothing: malformed input or output that does not fit the configured
//! capacity is an [`LocationError::Encoding`], never a truncated string.

use crate::error::{LocationError, Result};
use encoding_rs::{DecoderResult, GB18030};

/// Default output capacity in bytes
pub const DEFAULT_OUTPUT_CAPACITY: usize = 512;

/// Converts legacy-encoded bytes to UTF-8
pub trait Transcoder: Send + Sync {
    /// Convert `input`, failing if it is malformed or too large
    fn transcode(&self, input: &[u8]) -> Result<String>;
}

/// [`Transcoder`] for GB18030 input with a bounded output size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gb18030Transcoder {
    capacity: usize,
}

impl Gb18030Transcoder {
    /// Transcoder with [`DEFAULT_OUTPUT_CAPACITY`]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_OUTPUT_CAPACITY)
    }

    /// Transcoder whose output may not exceed `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self { capacity }
    }

    /// Maximum output size in bytes
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Decode `input` into `dst`, returning the number of bytes written.
    ///
    /// `dst` is only meaningful up to the returned length. On error nothing
    /// written to `dst` should be used.
    pub fn transcode_into(&self, input: &[u8], dst: &mut [u8]) -> Result<usize> {
        let mut decoder = GB18030.new_decoder_without_bom_handling();
        let (result, read, written) =
            decoder.decode_to_utf8_without_replacement(input, dst, true);

        match result {
            DecoderResult::InputEmpty => Ok(written),
            DecoderResult::OutputFull => Err(LocationError::Encoding(format!(
                "converted text exceeds {} byte output buffer",
                dst.len()
            ))),
            DecoderResult::Malformed(len, extra) => {
                let at = read.saturating_sub(len as usize + extra as usize);
                Err(LocationError::Encoding(format!(
                    "malformed GB18030 sequence at byte {}",
                    at
                )))
            }
        }
    }
}

impl Default for Gb18030Transcoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Transcoder for Gb18030Transcoder {
    fn transcode(&self, input: &[u8]) -> Result<String> {
        let mut buf = vec![0u8; self.capacity];
        let written = self.transcode_into(input, &mut buf)?;
        buf.truncate(written);
        String::from_utf8(buf).map_err(|e| LocationError::Encoding(e.to_string()))
    }
}

/// Encode UTF-8 text as GB18030, failing on unmappable characters.
///
/// GB18030 covers all of Unicode, so this only fails on the rare characters
/// the WHATWG encoder declines to map.
pub fn encode_gb18030(text: &str) -> Result<Vec<u8>> {
    let (bytes, _, had_errors) = GB18030.encode(text);
    if had_errors {
        return Err(LocationError::Encoding(format!(
            "cannot encode {:?} as GB18030",
            text
        )));
    }
    Ok(bytes.into_owned())
}

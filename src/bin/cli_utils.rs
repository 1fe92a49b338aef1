use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use iplocation::Database;
use std::fs::File;
use std::io::{self, stdin, BufRead, BufReader};
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Buffer size for input files
const BUFFER_SIZE: usize = 64 * 1024;

/// Install the stderr subscriber. `RUST_LOG` wins over `--verbose`.
pub fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Load the database at `path` with default options
pub fn open_database(path: &Path) -> Result<Database> {
    Database::from(path)
        .open()
        .with_context(|| format!("Failed to load database: {}", path.display()))
}

/// True if `path` ends in `.gz` (case-insensitive)
pub fn is_gzip(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false)
}

/// Open a line input. `-` is stdin and `.gz` files are decompressed.
pub fn open_input(path: &Path) -> Result<Box<dyn BufRead + Send>> {
    if path.to_str() == Some("-") {
        return Ok(Box::new(BufReader::with_capacity(BUFFER_SIZE, stdin())));
    }

    let file =
        File::open(path).with_context(|| format!("Failed to open input: {}", path.display()))?;
    if is_gzip(path) {
        Ok(Box::new(BufReader::with_capacity(
            BUFFER_SIZE,
            GzDecoder::new(file),
        )))
    } else {
        Ok(Box::new(BufReader::with_capacity(BUFFER_SIZE, file)))
    }
}

/// Pull the address out of a request string such as `ip=1.2.3.4&x=y`.
///
/// A bare address is returned as-is.
pub fn address_from_query_string(query: &str) -> &str {
    for pair in query.split('&') {
        match pair.split_once('=') {
            Some(("ip", value)) => return value.trim(),
            Some(_) => continue,
            None => return pair.trim(),
        }
    }
    query.trim()
}

/// Format a byte count with a binary unit suffix
pub fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;
    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

use anyhow::{Context, Result};
use serde_json::json;
use std::path::PathBuf;

use crate::cli_utils::{format_bytes, open_database};

pub fn cmd_inspect(database: PathBuf, json_output: bool) -> Result<()> {
    let db = open_database(&database)?;

    let (index_start, index_end) = db.index_range();
    let entries = db.entry_count();
    let (first_start, first_end) = db.range(0).context("Failed to read first index entry")?;
    let (last_start, last_end) = db
        .range(entries - 1)
        .context("Failed to read last index entry")?;
    // The version record is informational; a broken one is shown, not fatal
    let version = db.version().map(|v| v.to_string());

    if json_output {
        let mut output = json!({
            "file": database.display().to_string(),
            "size": db.size(),
            "mapped": db.buffer().is_mapped(),
            "index_start": index_start,
            "index_end": index_end,
            "entry_count": entries,
            "first_range": [first_start.to_string(), first_end.to_string()],
            "last_range": [last_start.to_string(), last_end.to_string()],
        });
        match &version {
            Ok(v) => output["version"] = json!(v),
            Err(e) => output["version_error"] = json!(e.to_string()),
        }
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("Database: {}", database.display());
        println!("Size:     {}", format_bytes(db.size()));
        let loading = if db.buffer().is_mapped() {
            "memory-mapped"
        } else {
            "in memory"
        };
        println!("Loading:  {}", loading);
        println!();
        println!("Index:");
        println!("  Offsets:     {} - {}", index_start, index_end);
        println!("  Entries:     {}", entries);
        println!("  First range: {} - {}", first_start, first_end);
        println!("  Last range:  {} - {}", last_start, last_end);
        println!();
        match &version {
            Ok(v) => println!("Version:  {}", v),
            Err(e) => println!("Version:  unreadable ({})", e),
        }
    }

    Ok(())
}

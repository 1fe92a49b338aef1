use anyhow::{bail, Context, Result};
use iplocation::DatabaseBuilder;
use std::fs;
use std::io::BufRead;
use std::path::PathBuf;

use crate::cli_utils::{format_bytes, open_input};

/// Build a database from `start_ip,end_ip,country,area` lines.
///
/// Blank lines and lines starting with `#` are skipped. The area may be
/// omitted or empty, and may itself contain commas.
pub fn cmd_build(input: PathBuf, output: PathBuf) -> Result<()> {
    let reader = open_input(&input)?;
    let mut builder = DatabaseBuilder::new();

    for (i, line) in reader.lines().enumerate() {
        let line_no = i + 1;
        let line = line.with_context(|| format!("Failed to read {}", input.display()))?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut fields = line.splitn(4, ',');
        let (start, end, country) = match (fields.next(), fields.next(), fields.next()) {
            (Some(start), Some(end), Some(country)) => (start, end, country),
            _ => bail!(
                "{}:{}: expected start_ip,end_ip,country[,area]",
                input.display(),
                line_no
            ),
        };
        let area = fields.next().unwrap_or("");

        builder
            .add_range(start, end, country.trim(), area.trim())
            .with_context(|| format!("{}:{}: invalid range", input.display(), line_no))?;
    }

    tracing::debug!(ranges = builder.len(), "parsed build input");
    let bytes = builder.build().context("Failed to build database")?;
    fs::write(&output, &bytes)
        .with_context(|| format!("Failed to write database: {}", output.display()))?;

    println!("✓ Database built: {}", output.display());
    println!("  Ranges: {}", builder.len());
    println!("  Size:   {}", format_bytes(bytes.len()));
    Ok(())
}

use anyhow::{Context, Result};
use iplocation::Database;
use serde_json::json;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Instant;

use crate::cli_utils::{address_from_query_string, open_database, open_input};

pub fn cmd_serve(database: PathBuf, input: PathBuf, json_output: bool) -> Result<()> {
    // A database that fails to load ends the session before any request
    let db = open_database(&database)?;
    let mut reader = open_input(&input)?;
    let mut out = io::stdout().lock();

    let mut line = Vec::new();
    let mut served = 0usize;
    let mut failed = 0usize;
    loop {
        line.clear();
        let n = reader
            .read_until(b'\n', &mut line)
            .with_context(|| format!("Failed to read requests from: {}", input.display()))?;
        if n == 0 {
            break;
        }

        let request = String::from_utf8_lossy(&line);
        let request = address_from_query_string(request.trim());
        if request.is_empty() {
            continue;
        }

        let started = Instant::now();
        let response = answer(&db, request, json_output);
        tracing::debug!(
            request,
            ok = response.is_ok(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "request served"
        );
        if response.is_err() {
            failed += 1;
        }
        let text = match response {
            Ok(text) | Err(text) => text,
        };
        writeln!(out, "{}", text)?;
        out.flush()?;
        served += 1;
    }

    tracing::debug!(served, failed, "request stream finished");
    Ok(())
}

/// Render one response line; `Err` carries the rendered failure
fn answer(db: &Database, request: &str, json_output: bool) -> std::result::Result<String, String> {
    match db.lookup(request) {
        Ok(location) if json_output => Ok(json!({
            "ip": request,
            "country": location.country,
            "area": location.area,
        })
        .to_string()),
        Ok(location) => Ok(location.to_string()),
        Err(e) if json_output => Err(json!({ "ip": request, "error": e.to_string() }).to_string()),
        Err(e) => Err(format!("error: {}", e)),
    }
}

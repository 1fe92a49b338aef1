use anyhow::{Context, Result};
use serde_json::json;
use std::io::{self, Write};
use std::path::PathBuf;

use crate::cli_utils::{address_from_query_string, open_database};

pub fn cmd_query(
    database: PathBuf,
    ip: Option<String>,
    json_output: bool,
    raw: bool,
) -> Result<()> {
    // Fall back to the request environment when no address is given
    let query = match ip {
        Some(ip) => ip,
        None => {
            let env = std::env::var("QUERY_STRING")
                .context("No address given and QUERY_STRING is not set")?;
            address_from_query_string(&env).to_string()
        }
    };

    let db = open_database(&database)?;
    let addr = iplocation::parse_ipv4(&query)?;

    if raw {
        let location = db
            .lookup_raw(u32::from(addr))
            .with_context(|| format!("Query failed for: {}", query))?;
        let mut out = io::stdout().lock();
        out.write_all(&location.joined())?;
        out.write_all(b"\n")?;
        return Ok(());
    }

    let location = db
        .lookup_ip(addr)
        .with_context(|| format!("Query failed for: {}", query))?;

    if json_output {
        let output = json!({
            "ip": addr.to_string(),
            "country": location.country,
            "area": location.area,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}", location);
    }

    Ok(())
}

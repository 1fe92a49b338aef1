use anyhow::Result;
use iplocation::validation::validate;
use serde_json::json;
use std::path::PathBuf;
use std::time::Instant;

use crate::cli_utils::open_database;

pub fn cmd_validate(database: PathBuf, json_output: bool) -> Result<()> {
    let db = open_database(&database)?;

    let start = Instant::now();
    let report = validate(&db);
    let duration = start.elapsed();

    if json_output {
        let output = json!({
            "database": database.display().to_string(),
            "is_valid": report.is_valid(),
            "duration_ms": duration.as_millis(),
            "errors": report.errors,
            "warnings": report.warnings,
            "info": report.info,
            "stats": report.stats,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("Validating: {}", database.display());
        println!();

        println!("Statistics:");
        println!("  {}", report.stats.summary());
        println!("  Max pointer hops: {}", report.stats.max_hops);
        println!("  Validation time: {}ms", duration.as_millis());
        println!();

        if !report.errors.is_empty() {
            println!("❌ ERRORS ({}):", report.errors.len());
            for error in &report.errors {
                println!("  • {}", error);
            }
            println!();
        }

        if !report.warnings.is_empty() {
            println!("⚠️  WARNINGS ({}):", report.warnings.len());
            for warning in &report.warnings {
                println!("  • {}", warning);
            }
            println!();
        }

        for info in &report.info {
            println!("ℹ️  {}", info);
        }
        println!();

        if report.is_valid() {
            println!("✅ VALIDATION PASSED");
        } else {
            println!("❌ VALIDATION FAILED");
            println!("   Database has {} error(s).", report.errors.len());
        }
    }

    if report.is_valid() {
        Ok(())
    } else {
        std::process::exit(1);
    }
}

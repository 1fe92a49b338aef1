mod cli_utils;
mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::{cmd_build, cmd_inspect, cmd_query, cmd_serve, cmd_validate};

#[derive(Parser)]
#[command(name = "iplocation")]
#[command(
    about = "Look up IPv4 addresses in a QQWry-format geolocation database",
    long_about = "iplocation - IPv4 geolocation lookups against QQWry-format (.dat) databases\n\n\
    Resolves an address to its country and area, converting the database's GB18030\n\
    strings to UTF-8. Databases are read fully into memory at startup and\n\
    gzip-compressed files (.gz) are decompressed first.\n\n\
    Examples:\n\
      iplocation query 8.8.8.8\n\
      iplocation -d qqwry.dat query 114.114.114.114 --json\n\
      iplocation serve requests.txt\n\
      iplocation inspect\n\
      iplocation validate --json\n\
      iplocation build ranges.csv -o custom.dat"
)]
#[command(version)]
struct Cli {
    /// Path to the database file
    #[arg(
        short = 'd',
        long,
        global = true,
        env = "IPLOCATION_DB",
        default_value = "qqwry.dat",
        value_name = "DATABASE"
    )]
    database: PathBuf,

    /// Enable debug logging to stderr (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Look up a single address
    Query {
        /// IPv4 address; read from QUERY_STRING when omitted
        #[arg(value_name = "IP")]
        ip: Option<String>,

        /// Output the location as JSON
        #[arg(short, long)]
        json: bool,

        /// Print the undecoded GB18030 bytes instead of UTF-8
        #[arg(long, conflicts_with = "json")]
        raw: bool,
    },

    /// Answer one lookup per input line until end of input
    Serve {
        /// File of addresses, one per line (.gz allowed), or "-" for stdin
        #[arg(value_name = "INPUT", default_value = "-")]
        input: PathBuf,

        /// Output one JSON object per line
        #[arg(short, long)]
        json: bool,
    },

    /// Show database header, size, and version record
    Inspect {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Check every index entry and record of a database
    Validate {
        /// Output results as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Build a database from `start_ip,end_ip,country,area` lines
    Build {
        /// Input text file (.gz allowed), or "-" for stdin
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Output database file
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    cli_utils::init_logging(cli.verbose);

    match cli.command {
        Commands::Query { ip, json, raw } => cmd_query(cli.database, ip, json, raw),
        Commands::Serve { input, json } => cmd_serve(cli.database, input, json),
        Commands::Inspect { json } => cmd_inspect(cli.database, json),
        Commands::Validate { json } => cmd_validate(cli.database, json),
        Commands::Build { input, output } => cmd_build(input, output),
    }
}

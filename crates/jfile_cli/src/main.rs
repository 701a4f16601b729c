//! jfile CLI
//!
//! Command-line tools for journal arena files.
//!
//! # Commands
//!
//! - `inspect` - Display the header and per-type object counts
//! - `dump-objects` - List every physical object in file order
//! - `dump-entries` - Print the logical entries with their fields
//! - `verify` - Walk every entry and report integrity issues

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Journal file inspection tools.
#[derive(Parser)]
#[command(name = "jfile")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display header fields and object statistics
    Inspect {
        /// Path to the journal file
        path: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Dump every physical object, one per line
    DumpObjects {
        /// Path to the journal file
        path: PathBuf,

        /// Maximum number of objects to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Step over objects of unknown type instead of stopping
        #[arg(long)]
        skip_unknown: bool,
    },

    /// Dump entries in entry-array order
    DumpEntries {
        /// Path to the journal file
        path: PathBuf,

        /// Maximum number of entries to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Abort on the first integrity issue
        #[arg(long)]
        strict: bool,

        /// Skip the per-entry XOR hash check
        #[arg(long)]
        no_verify_xor: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Verify journal integrity
    Verify {
        /// Path to the journal file
        path: PathBuf,

        /// Abort on the first integrity issue
        #[arg(long)]
        strict: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect { path, format } => {
            commands::inspect::run(&path, &format)?;
        }
        Commands::DumpObjects {
            path,
            limit,
            skip_unknown,
        } => {
            commands::dump_objects::run(&path, limit, skip_unknown)?;
        }
        Commands::DumpEntries {
            path,
            limit,
            strict,
            no_verify_xor,
            format,
        } => {
            commands::dump_entries::run(&path, limit, strict, !no_verify_xor, &format)?;
        }
        Commands::Verify { path, strict } => {
            commands::verify::run(&path, strict)?;
        }
        Commands::Version => {
            println!("jfile CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("jfile core v{}", jfile_core::VERSION);
        }
    }

    Ok(())
}

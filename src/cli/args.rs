//! Command line argument parsing for the Tessera CLI using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

/// Tessera - inspect and maintain segment-based indexes
#[derive(Parser, Debug, Clone)]
#[command(name = "tessera")]
#[command(about = "Inspect and maintain Tessera segment indexes")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
pub struct TesseraArgs {
    /// Verbosity level (0=quiet, 1=normal, 2=verbose, 3=debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (overrides verbose)
    #[arg(short, long)]
    pub quiet: bool,

    /// Output format
    #[arg(short = 'f', long = "format", default_value = "human")]
    pub output_format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

impl TesseraArgs {
    /// Get the effective verbosity level
    pub fn verbosity(&self) -> u8 {
        if self.quiet {
            0
        } else {
            match self.verbose {
                0 => 1,
                n => n,
            }
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Verify the checksums and structure of every segment
    Check(IndexPathArgs),

    /// List the segments of the latest commit
    Segments(IndexPathArgs),

    /// List the registered codecs and formats
    Codecs,

    /// Add JSON Lines documents as one new segment
    Add(AddArgs),

    /// Find documents containing a term or phrase
    Search(SearchArgs),
}

/// Arguments naming an index directory
#[derive(Parser, Debug, Clone)]
pub struct IndexPathArgs {
    /// Path to the index directory
    #[arg(value_name = "INDEX_PATH")]
    pub index_path: PathBuf,
}

/// Arguments for adding documents
#[derive(Parser, Debug, Clone)]
pub struct AddArgs {
    /// Path to the index directory, created if missing
    #[arg(value_name = "INDEX_PATH")]
    pub index_path: PathBuf,

    /// Document file, one JSON document per line
    #[arg(value_name = "DOCUMENT_FILE")]
    pub document_file: PathBuf,

    /// Codec for the new segment
    #[arg(short, long, env = "TESSERA_CODEC", default_value = "Tessera10")]
    pub codec: String,

    /// Values per page of packed doc values and norms
    #[arg(long, default_value = "1024")]
    pub packed_page_size: usize,
}

/// Arguments for searching
#[derive(Parser, Debug, Clone)]
pub struct SearchArgs {
    /// Path to the index directory
    #[arg(value_name = "INDEX_PATH")]
    pub index_path: PathBuf,

    /// Field to search in
    #[arg(value_name = "FIELD")]
    pub field: String,

    /// Terms; more than one is matched as an exact phrase
    #[arg(value_name = "TERMS", required = true)]
    pub terms: Vec<String>,

    /// Maximum number of documents to print
    #[arg(short, long, default_value = "10")]
    pub limit: usize,
}

/// Output formats supported by CLI
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable format
    Human,
    /// JSON format
    Json,
}

//! Command-line definitions.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Single-event seismic hypocenter locator", long_about = None)]
pub struct Cli {
    /// Set the logging level
    #[arg(long, default_value = "info")]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Locate a single event from a request file
    Locate {
        /// Request file (JSON or Hydra text)
        #[arg(short, long)]
        input: PathBuf,
        /// Response file; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Payload format
        #[arg(long, value_enum, default_value_t = Format::Json)]
        format: Format,
        /// Craton polygons (JSON)
        #[arg(long)]
        cratons: Option<PathBuf>,
        /// Zone depth statistics (JSON)
        #[arg(long)]
        zones: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// JSON request in, JSON response out
    Json,
    /// Hydra-style text in, legacy summary out
    Hydra,
}

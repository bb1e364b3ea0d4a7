use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pocketforge")]
#[command(author, version, about = "Batch video conversion for handheld players")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert one or more video files (Ctrl-C cancels)
    Convert {
        /// Input files, converted in order
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output directory (defaults to each input's directory)
        #[arg(short, long)]
        dest: Option<PathBuf>,

        /// Print every progress snapshot as a JSON line
        #[arg(long)]
        json: bool,
    },

    /// Check that the encoder is available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Show the most recent diagnostics log entries
    Logs {
        /// Number of entries to show
        #[arg(short = 'n', long, default_value = "50")]
        lines: usize,
    },

    /// Display version information
    Version,
}

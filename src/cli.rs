use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "vidmill")]
#[command(author, version, about = "Batch media-operation engine driving ffmpeg/ffprobe")]
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
    /// Run a single operation request described in a JSON file
    Run {
        /// JSON file holding one operation request
        #[arg(required = true)]
        request: PathBuf,
    },

    /// Run a batch of operation requests concurrently
    Batch {
        /// JSON file holding an array of operation requests
        #[arg(required = true)]
        requests: PathBuf,

        /// Override the configured worker count
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Probe a media file and display information
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}

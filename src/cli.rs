//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Archive media posted in chat channels.
///
/// Messages are read as JSON lines, their links resolved and downloaded into
/// per-channel folders according to the settings file.
#[derive(Parser, Debug)]
#[command(name = "media-archiver")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Settings file (defaults to ./settings.json, then the user config dir)
    #[arg(long, value_name = "PATH", global = true)]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Run chat messages (one JSON object per line) through the download pipeline
    Process {
        /// Input file; reads stdin when omitted
        file: Option<PathBuf>,

        /// Treat the messages as a history replay
        #[arg(long)]
        history: bool,
    },

    /// Create a starter settings file interactively
    Init {
        /// Overwrite an existing settings file
        #[arg(long)]
        force: bool,
    },

    /// Print archived download counts
    Stats {
        /// Limit to one channel and list its most recent downloads
        #[arg(long, value_name = "ID")]
        channel: Option<String>,

        /// Number of recent downloads to list (1-1000)
        #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(i64).range(1..=1000))]
        limit: i64,
    },
}

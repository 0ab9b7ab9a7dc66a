//! CLI interface using clap.
//!
//! Provides command-line arguments and subcommands for the tool.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Conversation Archiver - Export ChatGPT conversations as Markdown.
///
/// Works against captured pages: point it at a snapshot directory with
/// --snapshots and export single conversations, whole history selections
/// as ZIP archives, or render individual captures.
#[derive(Parser, Debug)]
#[command(name = "conversation-archiver")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging (use multiple times for more verbosity).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file to use instead of the default.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory of page captures to serve pages from.
    #[arg(short, long)]
    pub snapshots: Option<PathBuf>,

    /// Capture file to treat as the active page.
    #[arg(short, long)]
    pub page: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Export the conversation on the active page as a Markdown file.
    Export,

    /// Export several conversations as one ZIP of Markdown files.
    Batch {
        /// Conversation ids or URLs to export.
        #[arg(conflicts_with = "all")]
        ids: Vec<String>,

        /// Export every conversation found in the history.
        #[arg(long)]
        all: bool,
    },

    /// List the conversations in the sidebar history.
    History,

    /// Render a single page capture to Markdown.
    Render {
        /// Path to the capture file.
        file: PathBuf,

        /// Output file path (stdout if not specified).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Pack files into an uncompressed ZIP archive.
    Pack {
        /// Files to include.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Archive file path.
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Show the directories and files in use.
    Paths,

    /// Create the configuration file if it doesn't exist.
    Init {
        /// Rewrite the file with every setting spelled out.
        #[arg(long)]
        force: bool,
    },
}

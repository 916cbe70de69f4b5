//! CLI module for Resumo.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use clap::{Parser, Subcommand};

/// Resumo - Video Transcription and Summarization
///
/// Extracts audio from videos, transcribes and summarizes it with an AI
/// provider, and tracks per-run usage costs.
#[derive(Parser, Debug)]
#[command(name = "resumo")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Process a video URL or local audio file
    Process {
        /// Video URL or local audio file path
        input: String,

        /// Provider to use (gemini, openai)
        #[arg(short, long)]
        provider: Option<String>,

        /// Provider API key (falls back to the stored key for --user)
        #[arg(short, long)]
        api_key: Option<String>,

        /// User identity for credential lookup and result persistence
        #[arg(short, long)]
        user: Option<String>,

        /// Print the full transcription instead of a preview
        #[arg(long)]
        full: bool,
    },

    /// Start the HTTP API server
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Open configuration file in editor
    Edit,

    /// Show configuration file path
    Path,
}

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Timed,
    Json,
    Srt,
}

#[derive(Parser)]
#[command(
    name = "ytstudy",
    about = "Search YouTube, read transcripts, chat about videos and keep notes",
    version
)]
pub struct Cli {
    /// Show request flow and transcript source on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Store the YouTube Data API key and the Gemini API key
    Setup {
        #[arg(long)]
        youtube_key: String,

        #[arg(long)]
        gemini_key: String,
    },

    /// Search videos
    Search {
        /// Free-text query
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,
    },

    /// Print the transcript of a video
    Transcript {
        /// YouTube video URL or video ID
        url: String,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Timed)]
        format: OutputFormat,

        /// Write output to file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Ask a single question about a video
    Ask {
        /// YouTube video URL or video ID
        url: String,

        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
    },

    /// Summarize a video
    Summarize {
        /// YouTube video URL or video ID
        url: String,
    },

    /// Show, append to, or export the notes for a video
    Notes {
        /// YouTube video URL or video ID
        url: String,

        /// Append a line to the notes
        #[arg(short, long)]
        add: Option<String>,

        /// Export notes and transcript to a text file
        #[arg(short, long)]
        export: Option<PathBuf>,
    },

    /// Interactive session (default)
    Shell,
}

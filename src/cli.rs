use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::request::RequestedSource;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Translate a single term or phrase
    Translate {
        /// Text to translate
        text: String,

        /// Source to use: auto, keyboard_fixer, local, libre or openrouter_ai
        #[arg(short, long)]
        source: Option<RequestedSource>,
    },

    /// Read lines from stdin as clipboard changes and print results as they arrive
    Watch {
        /// Treat input lines as hotkey triggers instead of clipboard changes
        #[arg(long)]
        hotkey: bool,

        /// Source override for every trigger
        #[arg(short, long)]
        source: Option<RequestedSource>,
    },

    /// Search the local dictionary
    Lookup {
        /// Term or fragment to look up
        query: String,

        /// Maximum number of matches to list
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Fix text typed under the wrong keyboard layout
    Fix {
        /// Mistyped text
        text: String,
    },

    /// Show engine and dictionary statistics
    Stats,

    /// Write a configuration file with default values
    InitConfig {
        /// Output file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

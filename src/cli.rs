// SPDX-License-Identifier: MIT OR Apache-2.0

//! CLI argument parsing using clap

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// ragsift - Retrieval-augmented question answering
///
/// Indexes tab-separated passage files, then answers questions from the
/// most relevant non-redundant passages.
#[derive(Parser, Debug)]
#[command(name = "ragsift")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true)]
    pub format: Option<OutputFormat>,

    /// Compact JSON output (no pretty formatting)
    #[arg(long, global = true)]
    pub compact: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for results
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Embed an entries file (`source_id<TAB>text` per line) into the index
    Index {
        /// Path to the entries file
        entries: String,

        /// Directory holding the index (defaults to current directory)
        #[arg(short, long)]
        path: Option<String>,

        /// Drop the existing index and rebuild it
        #[arg(short, long)]
        force: bool,
    },

    /// Answer a question from the indexed passages
    #[command(alias = "a")]
    Ask {
        /// The question
        query: String,

        /// Directory holding the index (searches parents of the current directory by default)
        #[arg(short, long)]
        path: Option<String>,

        /// Number of candidates fetched from the index
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Cosine similarity at or above which passages count as duplicates (0.0-1.0)
        #[arg(short, long)]
        threshold: Option<f32>,

        /// Maximum number of passages handed to the generator
        #[arg(short = 'm', long)]
        max_results: Option<usize>,

        /// Embed all candidates in one batch before selection
        #[arg(long)]
        prefetch: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

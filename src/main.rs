// SPDX-License-Identifier: MIT OR Apache-2.0

//! ragsift - Retrieval-augmented question answering
//!
//! Indexes passages with an embedding model, retrieves the closest ones for
//! a question, drops near-duplicates and asks a generator for the answer.

mod cli;
mod commands;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Commands, OutputFormat};
use ragsift::config::{Config, ConfigOutputFormat};
use ragsift::utils::get_root_with_index;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Initialize tracing with RAGSIFT_LOG env var (e.g., RAGSIFT_LOG=debug ragsift ask "query")
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RAGSIFT_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let format = match cli.format {
        Some(format) => format,
        None => match Config::load_from_dir(&config_root(&cli.command)?).default_format {
            Some(ConfigOutputFormat::Json) => OutputFormat::Json,
            _ => OutputFormat::Text,
        },
    };

    match cli.command {
        Commands::Index {
            entries,
            path,
            force,
        } => {
            commands::index::run(&entries, path.as_deref(), force, format, cli.compact)?;
        }
        Commands::Ask {
            query,
            path,
            top_k,
            threshold,
            max_results,
            prefetch,
        } => {
            let args = commands::ask::AskArgs {
                query: &query,
                path: path.as_deref(),
                top_k,
                threshold,
                max_results,
                prefetch,
            };
            commands::ask::run(args, format, cli.compact)?;
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "ragsift", &mut std::io::stdout());
        }
    }

    Ok(())
}

/// Directory whose config the command reads; matches the root each command resolves.
fn config_root(command: &Commands) -> Result<PathBuf> {
    let root = match command {
        Commands::Index { path: Some(p), .. } | Commands::Ask { path: Some(p), .. } => {
            PathBuf::from(p)
        }
        Commands::Ask { path: None, .. } => get_root_with_index(std::env::current_dir()?),
        Commands::Index { path: None, .. } | Commands::Completions { .. } => {
            std::env::current_dir()?
        }
    };
    Ok(root)
}

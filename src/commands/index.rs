// SPDX-License-Identifier: MIT OR Apache-2.0

//! Build the passage index from an entries file

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::cli::OutputFormat;
use ragsift::config::Config;
use ragsift::embedding::{create_provider, PassageStore};
use ragsift::ingest::{ingest_entries, read_entries, IngestOptions};
use ragsift::output::print_json;

/// Index summary for JSON output
#[derive(Debug, Serialize)]
struct IndexSummary {
    index: String,
    model: String,
    total: usize,
    inserted: usize,
    skipped: usize,
    passages: u64,
    elapsed_ms: u128,
}

/// Run the index command
pub fn run(
    entries: &str,
    path: Option<&str>,
    force: bool,
    format: OutputFormat,
    compact: bool,
) -> Result<()> {
    let root = match path {
        Some(p) => PathBuf::from(p),
        None => std::env::current_dir()?,
    };
    let config = Config::load_from_dir(&root);
    let index_path = config.index_path(&root);
    let started = Instant::now();

    let entries = read_entries(Path::new(entries))?;
    let mut provider = create_provider(&config.embeddings)?;
    let mut store = PassageStore::open(&index_path)
        .with_context(|| format!("Failed to open index at {}", index_path.display()))?;

    let options = IngestOptions {
        force,
        show_progress: format == OutputFormat::Text && std::io::stderr().is_terminal(),
    };
    let stats = ingest_entries(&entries, provider.as_mut(), &mut store, options)?;

    let summary = IndexSummary {
        index: index_path.display().to_string(),
        model: provider.model_id().to_string(),
        total: stats.total,
        inserted: stats.inserted,
        skipped: stats.skipped,
        passages: store.count_passages()?,
        elapsed_ms: started.elapsed().as_millis(),
    };

    match format {
        OutputFormat::Json => print_json(&summary, compact)?,
        OutputFormat::Text => {
            println!(
                "{} {} new, {} unchanged ({} passages in {})",
                "Indexed".green().bold(),
                summary.inserted,
                summary.skipped,
                summary.passages,
                summary.index
            );
        }
    }

    Ok(())
}

// SPDX-License-Identifier: MIT OR Apache-2.0

//! Answer a question from the passage index

use anyhow::{bail, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;
use tracing::debug;

use crate::cli::OutputFormat;
use ragsift::config::Config;
use ragsift::embedding::{create_provider, PassageStore};
use ragsift::generation::create_generator;
use ragsift::output::{colorize_heading, format_candidate, print_json, use_colors};
use ragsift::pipeline::{RagParams, RagPipeline};
use ragsift::retrieval::Candidate;
use ragsift::selection::SelectionStats;
use ragsift::utils::get_root_with_index;

/// Answer payload for JSON output
#[derive(Debug, Serialize)]
struct AskOutput<'a> {
    query: &'a str,
    answer: &'a str,
    selected: &'a [Candidate],
    stats: SelectionStats,
    elapsed_ms: u128,
}

/// Per-query overrides from the command line
pub struct AskArgs<'a> {
    pub query: &'a str,
    pub path: Option<&'a str>,
    pub top_k: Option<usize>,
    pub threshold: Option<f32>,
    pub max_results: Option<usize>,
    pub prefetch: bool,
}

/// Run the ask command
pub fn run(args: AskArgs<'_>, format: OutputFormat, compact: bool) -> Result<()> {
    let root = match args.path {
        Some(p) => PathBuf::from(p),
        None => get_root_with_index(std::env::current_dir()?),
    };
    let config = Config::load_from_dir(&root);
    let index_path = config.index_path(&root);
    if !index_path.is_file() {
        bail!(
            "No index found at {}. Run `ragsift index <entries>` first.",
            index_path.display()
        );
    }

    let params = RagParams {
        top_k: config.merge_top_k(args.top_k),
        similarity_threshold: config.merge_similarity_threshold(args.threshold),
        max_results: config.merge_max_results(args.max_results),
        prefetch: args.prefetch || config.rag.prefetch(),
    };
    debug!(?params, index = %index_path.display(), "answering query");

    let started = Instant::now();
    let store = PassageStore::open(&index_path)?;
    let mut embedder = create_provider(&config.embeddings)?;
    store.check_model(embedder.model_id())?;
    let mut generator = create_generator(&config.generation)?;

    let result = RagPipeline::new(embedder.as_mut(), &store, generator.as_mut())
        .run(args.query, params)?;

    match format {
        OutputFormat::Json => {
            let payload = AskOutput {
                query: args.query,
                answer: &result.answer,
                selected: &result.selected,
                stats: result.stats,
                elapsed_ms: started.elapsed().as_millis(),
            };
            print_json(&payload, compact)?;
        }
        OutputFormat::Text => {
            let use_color = use_colors();
            println!("{}", colorize_heading("Answer", use_color));
            println!("{}", result.answer.trim());
            println!();
            println!("{}", colorize_heading("Retrieved passages", use_color));
            if result.selected.is_empty() {
                println!("(none)");
            }
            for (idx, candidate) in result.selected.iter().enumerate() {
                println!("{}", format_candidate(idx + 1, candidate, use_color));
            }
        }
    }

    Ok(())
}

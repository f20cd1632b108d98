// SPDX-License-Identifier: MIT OR Apache-2.0

//! Entries file ingestion.
//!
//! An entries file holds one passage per line as `source_id<TAB>text`.
//! Ingestion embeds the passages in provider-sized batches and appends them
//! to a [`PassageStore`], skipping passages that are already stored.

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::path::Path;
use tracing::{debug, info};

use crate::embedding::storage::{PassageInput, PassageStore};
use crate::embedding::EmbeddingProvider;

/// One parsed line of an entries file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub source_id: String,
    pub text: String,
    /// 1-indexed line number in the entries file
    pub line: usize,
}

/// Options for [`ingest_entries`]
#[derive(Debug, Clone, Copy, Default)]
pub struct IngestOptions {
    /// Drop the existing index before ingesting
    pub force: bool,
    /// Draw a progress bar on stderr
    pub show_progress: bool,
}

/// Counters from one ingestion run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Entries read from the file
    pub total: usize,
    /// Passages written to the index
    pub inserted: usize,
    /// Entries already present (or repeated within the file)
    pub skipped: usize,
}

/// Parse entries file content.
pub fn parse_entries(content: &str) -> Result<Vec<Entry>> {
    let mut entries = Vec::new();
    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let Some((source_id, text)) = line.split_once('\t') else {
            bail!("line {}: expected `source_id<TAB>text`", idx + 1);
        };
        let text = text.trim();
        if text.is_empty() {
            bail!("line {}: entry text is empty", idx + 1);
        }
        entries.push(Entry {
            source_id: source_id.trim().to_string(),
            text: text.to_string(),
            line: idx + 1,
        });
    }
    Ok(entries)
}

/// Read and parse an entries file.
pub fn read_entries(path: &Path) -> Result<Vec<Entry>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read entries file: {}", path.display()))?;
    parse_entries(&content).with_context(|| format!("Invalid entries file: {}", path.display()))
}

/// Hash of a passage text used to detect already-stored entries.
pub fn content_hash(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

/// Embed `entries` and store them.
///
/// With `force`, every entry is embedded first and the index is then
/// replaced in a single transaction, so a failed rebuild keeps the old index.
pub fn ingest_entries(
    entries: &[Entry],
    provider: &mut dyn EmbeddingProvider,
    store: &mut PassageStore,
    options: IngestOptions,
) -> Result<IngestStats> {
    let hashes: Vec<String> = entries.par_iter().map(|e| content_hash(&e.text)).collect();
    let mut pending: Vec<(&Entry, &str)> = Vec::with_capacity(entries.len());
    for (entry, hash) in entries.iter().zip(hashes.iter()) {
        if options.force || !store.contains(&entry.source_id, hash)? {
            pending.push((entry, hash.as_str()));
        }
    }

    let mut stats = IngestStats {
        total: entries.len(),
        skipped: entries.len() - pending.len(),
        ..Default::default()
    };
    info!(
        total = stats.total,
        pending = pending.len(),
        force = options.force,
        "ingesting entries"
    );

    let pb = if options.show_progress {
        let pb = ProgressBar::new(pending.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{bar:40.cyan/blue}] {pos}/{len} entries | Embedding {msg}")
                .context("invalid progress bar template")?
                .progress_chars("##."),
        );
        pb
    } else {
        ProgressBar::hidden()
    };

    let batch_size = provider.batch_size().max(1);
    let mut dimension = if options.force {
        None
    } else {
        store.dimension()?
    };
    let mut rebuilt: Vec<Vec<f32>> = Vec::new();

    for batch in pending.chunks(batch_size) {
        let texts: Vec<String> = batch.iter().map(|(e, _)| e.text.clone()).collect();
        if let Some((first, _)) = batch.first() {
            pb.set_message(first.source_id.clone());
        }
        let vectors = provider.embed_texts(&texts).with_context(|| {
            format!(
                "Failed to embed entries starting at line {}",
                batch.first().map(|(e, _)| e.line).unwrap_or_default()
            )
        })?;
        if vectors.len() != batch.len() {
            bail!(
                "Embedder returned {} vectors for {} entries",
                vectors.len(),
                batch.len()
            );
        }

        if let Some(first) = vectors.first() {
            if !options.force {
                store.ensure_model(provider.model_id(), first.len())?;
            }
        }
        for ((entry, _), vector) in batch.iter().zip(vectors.iter()) {
            match dimension {
                Some(expected) if expected != vector.len() => bail!(
                    "line {}: embedding dimension {} does not match index dimension {}",
                    entry.line,
                    vector.len(),
                    expected
                ),
                Some(_) => {}
                None => dimension = Some(vector.len()),
            }
        }

        if options.force {
            rebuilt.extend(vectors);
        } else {
            let inputs = passage_inputs(batch, &vectors);
            let inserted = store.insert_passages(&inputs)?;
            debug!(batch = batch.len(), inserted, "stored batch");
            stats.inserted += inserted;
            stats.skipped += batch.len() - inserted;
        }
        pb.inc(batch.len() as u64);
    }

    if options.force {
        let inserted = match dimension {
            Some(dimension) => {
                let inputs = passage_inputs(&pending, &rebuilt);
                store.replace_all(provider.model_id(), dimension, &inputs)?
            }
            None => {
                store.clear_all()?;
                0
            }
        };
        debug!(inserted, "rebuilt index");
        stats.inserted = inserted;
        stats.skipped += pending.len() - inserted;
    }

    pb.finish_and_clear();
    Ok(stats)
}

fn passage_inputs<'a>(
    batch: &[(&'a Entry, &'a str)],
    vectors: &'a [Vec<f32>],
) -> Vec<PassageInput<'a>> {
    batch
        .iter()
        .zip(vectors.iter())
        .map(|(&(entry, hash), vector)| PassageInput {
            source_id: &entry.source_id,
            text: &entry.text,
            content_hash: hash,
            embedding: vector,
        })
        .collect()
}

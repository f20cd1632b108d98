// SPDX-License-Identifier: MIT OR Apache-2.0

//! Redundancy-aware candidate selection.
//!
//! Takes the retriever's ranked candidates and keeps a small, diverse subset
//! in rank order. The scan is a single greedy pass: each candidate is
//! embedded on first sight and compared against the vectors of the slots
//! accepted so far. A candidate that is not similar enough to any slot opens
//! a new slot; a near-duplicate either replaces the most similar slot (when
//! its text is longer) or is dropped. Slots never move once created.
//!
//! The scan stops as soon as `max_results` slots exist, before embedding the
//! next candidate, so a near-duplicate arriving after the cap is reached
//! never gets to replace anything.

use anyhow::anyhow;
use serde::Serialize;
use tracing::debug;

use crate::embedding::EmbeddingProvider;
use crate::errors::{RagError, Result};
use crate::retrieval::Candidate;

/// Default cosine similarity at or above which two passages are duplicates
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.8;

/// Default number of passages kept for the context
pub const DEFAULT_MAX_RESULTS: usize = 3;

/// Configuration for candidate selection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionConfig {
    /// Cosine similarity threshold in [0, 1]
    pub similarity_threshold: f32,
    /// Maximum number of selected candidates (at least 1)
    pub max_results: usize,
    /// Embed every candidate in one batch before the decision loop
    pub prefetch: bool,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            max_results: DEFAULT_MAX_RESULTS,
            prefetch: false,
        }
    }
}

impl SelectionConfig {
    pub fn new(similarity_threshold: f32, max_results: usize) -> Self {
        Self {
            similarity_threshold,
            max_results,
            prefetch: false,
        }
    }

    /// Enable or disable batch prefetching of embeddings
    pub fn with_prefetch(mut self, prefetch: bool) -> Self {
        self.prefetch = prefetch;
        self
    }

    /// Check the configured bounds
    pub fn validate(&self) -> Result<()> {
        if self.max_results < 1 {
            return Err(RagError::InvalidConfiguration(format!(
                "max_results must be at least 1, got {}",
                self.max_results
            )));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(RagError::InvalidConfiguration(format!(
                "similarity_threshold must be within [0, 1], got {}",
                self.similarity_threshold
            )));
        }
        Ok(())
    }
}

/// A candidate together with its embedding vector
#[derive(Debug, Clone)]
pub struct EmbeddedCandidate {
    pub candidate: Candidate,
    pub vector: Vec<f32>,
}

/// Counters describing one selection run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SelectionStats {
    /// Candidates that were embedded
    pub embedded: usize,
    /// Candidates that opened a new slot
    pub accepted: usize,
    /// Candidates that replaced the occupant of an existing slot
    pub replaced: usize,
    /// Near-duplicates that were dropped
    pub discarded: usize,
}

/// Outcome of a selection run
#[derive(Debug, Clone, Default, Serialize)]
pub struct SelectionResult {
    /// Current slot occupants, in slot creation order
    pub selected: Vec<Candidate>,
    /// Selected texts joined by a single space
    pub context: String,
    pub stats: SelectionStats,
}

impl SelectionResult {
    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }
}

/// Greedy, order-preserving near-duplicate filter
#[derive(Debug, Clone)]
pub struct DeduplicationSelector {
    config: SelectionConfig,
}

impl DeduplicationSelector {
    /// Create a selector, rejecting out-of-range configuration
    pub fn new(config: SelectionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SelectionConfig {
        &self.config
    }

    /// Select from `candidates`, calling `embed` once per candidate scanned.
    pub fn select<F>(&self, candidates: &[Candidate], mut embed: F) -> Result<SelectionResult>
    where
        F: FnMut(&Candidate) -> anyhow::Result<Vec<f32>>,
    {
        let mut slots: Vec<EmbeddedCandidate> = Vec::with_capacity(self.config.max_results);
        let mut stats = SelectionStats::default();
        let mut dimension: Option<usize> = None;

        for (rank, candidate) in candidates.iter().enumerate() {
            if slots.len() >= self.config.max_results {
                debug!(rank, "selection cap reached; remaining candidates skipped");
                break;
            }
            candidate.validate()?;

            let vector =
                embed(candidate).map_err(|e| RagError::embedding(&candidate.source_id, e))?;
            stats.embedded += 1;

            match dimension {
                None => dimension = Some(vector.len()),
                Some(expected) if expected != vector.len() => {
                    return Err(RagError::embedding(
                        &candidate.source_id,
                        anyhow!(
                            "embedding dimension {} does not match {} used by earlier candidates",
                            vector.len(),
                            expected
                        ),
                    ));
                }
                Some(_) => {}
            }

            match most_similar(&vector, &slots) {
                Some((slot, similarity)) if similarity >= self.config.similarity_threshold => {
                    let occupant = &mut slots[slot];
                    if candidate.text_len() > occupant.candidate.text_len() {
                        debug!(
                            rank,
                            slot,
                            similarity,
                            source = %candidate.source_id,
                            replaced = %occupant.candidate.source_id,
                            "replacing shorter near-duplicate"
                        );
                        occupant.candidate = candidate.clone();
                        occupant.vector = vector;
                        stats.replaced += 1;
                    } else {
                        debug!(
                            rank,
                            slot,
                            similarity,
                            source = %candidate.source_id,
                            "discarding near-duplicate"
                        );
                        stats.discarded += 1;
                    }
                }
                _ => {
                    debug!(rank, slot = slots.len(), source = %candidate.source_id, "accepting candidate");
                    slots.push(EmbeddedCandidate {
                        candidate: candidate.clone(),
                        vector,
                    });
                    stats.accepted += 1;
                }
            }
        }

        let selected: Vec<Candidate> = slots.into_iter().map(|slot| slot.candidate).collect();
        let context = assemble_context(selected.iter().map(|c| c.text.as_str()));

        Ok(SelectionResult {
            selected,
            context,
            stats,
        })
    }

    /// Select using an embedding provider, honouring the prefetch setting.
    pub fn select_with_provider(
        &self,
        candidates: &[Candidate],
        provider: &mut dyn EmbeddingProvider,
    ) -> Result<SelectionResult> {
        if !self.config.prefetch {
            return self.select(candidates, |candidate| provider.embed_one(&candidate.text));
        }

        for candidate in candidates {
            candidate.validate()?;
        }
        let texts: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();
        let vectors = provider
            .embed_texts(&texts)
            .map_err(RagError::embedding_unattributed)?;
        if vectors.len() != candidates.len() {
            return Err(RagError::embedding_unattributed(anyhow!(
                "embedder returned {} vectors for {} candidates",
                vectors.len(),
                candidates.len()
            )));
        }

        let mut vectors = vectors.into_iter();
        self.select(candidates, |_| {
            vectors
                .next()
                .ok_or_else(|| anyhow!("prefetched embeddings exhausted"))
        })
    }
}

/// Select with explicit parameters; see [`DeduplicationSelector::select`].
pub fn select<F>(
    candidates: &[Candidate],
    embed: F,
    similarity_threshold: f32,
    max_results: usize,
) -> Result<SelectionResult>
where
    F: FnMut(&Candidate) -> anyhow::Result<Vec<f32>>,
{
    DeduplicationSelector::new(SelectionConfig::new(similarity_threshold, max_results))?
        .select(candidates, embed)
}

/// Join passage texts with a single space.
pub fn assemble_context<'a, I>(texts: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    texts.into_iter().collect::<Vec<_>>().join(" ")
}

/// Compute cosine similarity between two vectors
///
/// Returns 0.0 for empty, mismatched, or zero-norm vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}

/// Index and similarity of the slot closest to `vector`; ties go to the lowest index.
fn most_similar(vector: &[f32], slots: &[EmbeddedCandidate]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, slot) in slots.iter().enumerate() {
        let similarity = cosine_similarity(vector, &slot.vector);
        match best {
            Some((_, best_similarity)) if similarity <= best_similarity => {}
            _ => best = Some((idx, similarity)),
        }
    }
    best
}

// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retrieved candidates and the retriever interface.
//!
//! A retriever maps a query vector to an ordered list of candidates,
//! closest first. The ordering it returns is authoritative: downstream
//! selection keeps it and never re-sorts by distance.

use anyhow::Result;
use serde::Serialize;

use crate::errors::RagError;

/// One retrieved passage before selection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    /// Opaque identifier of the originating document (e.g. file path)
    pub source_id: String,
    /// The retrieved passage
    pub text: String,
    /// Distance reported by the retriever (lower is more relevant)
    pub distance: f32,
}

impl Candidate {
    /// Creates a candidate, rejecting empty text and negative or non-finite distances.
    pub fn new(
        source_id: impl Into<String>,
        text: impl Into<String>,
        distance: f32,
    ) -> std::result::Result<Self, RagError> {
        let candidate = Self {
            source_id: source_id.into(),
            text: text.into(),
            distance,
        };
        candidate.validate()?;
        Ok(candidate)
    }

    /// Checks the candidate invariants.
    pub fn validate(&self) -> std::result::Result<(), RagError> {
        if self.text.is_empty() {
            return Err(RagError::InvalidCandidate(format!(
                "empty text from source '{}'",
                self.source_id
            )));
        }
        if !self.distance.is_finite() || self.distance < 0.0 {
            return Err(RagError::InvalidCandidate(format!(
                "distance {} from source '{}' is not a non-negative number",
                self.distance, self.source_id
            )));
        }
        Ok(())
    }

    /// Length of the passage in characters, used by the longer-wins rule.
    pub fn text_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Trait for nearest-neighbour retrievers.
pub trait Retriever {
    /// Returns at most `top_k` candidates sorted by ascending distance.
    fn retrieve(&self, query_vector: &[f32], top_k: usize) -> Result<Vec<Candidate>>;
}

/// Fixed in-memory candidate list, returned as-is (truncated to `top_k`).
///
/// Useful when the ranked list comes from an outside system.
pub struct StaticRetriever {
    candidates: Vec<Candidate>,
}

impl StaticRetriever {
    pub fn new(candidates: Vec<Candidate>) -> Self {
        Self { candidates }
    }
}

impl Retriever for StaticRetriever {
    fn retrieve(&self, _query_vector: &[f32], top_k: usize) -> Result<Vec<Candidate>> {
        Ok(self.candidates.iter().take(top_k).cloned().collect())
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the retrieval-augmented answering pipeline

use thiserror::Error;

/// Result alias for pipeline and selection operations
pub type Result<T> = std::result::Result<T, RagError>;

/// Errors surfaced by candidate selection and `RagPipeline::run`
#[derive(Debug, Error)]
pub enum RagError {
    /// Caller-supplied parameters are out of range; no work was performed
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The embedder failed for a candidate (or for the query when `source_id` is None)
    #[error("Embedding failed for {}: {source:#}", describe_source(.source_id))]
    Embedding {
        source_id: Option<String>,
        #[source]
        source: anyhow::Error,
    },

    /// The retriever produced a candidate that violates the candidate invariants
    #[error("Invalid candidate: {0}")]
    InvalidCandidate(String),

    /// Passed through from the retriever
    #[error("Retrieval failed: {0:#}")]
    Retrieval(#[source] anyhow::Error),

    /// Passed through from the generator
    #[error("Generation failed: {0:#}")]
    Generation(#[source] anyhow::Error),
}

impl RagError {
    /// Build an embedding error for a specific candidate
    pub fn embedding(source_id: impl Into<String>, source: anyhow::Error) -> Self {
        RagError::Embedding {
            source_id: Some(source_id.into()),
            source,
        }
    }

    /// Build an embedding error that is not tied to one candidate
    pub fn embedding_unattributed(source: anyhow::Error) -> Self {
        RagError::Embedding {
            source_id: None,
            source,
        }
    }
}

fn describe_source(source_id: &Option<String>) -> String {
    match source_id {
        Some(id) => format!("candidate '{}'", id),
        None => "query".to_string(),
    }
}

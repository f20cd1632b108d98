// SPDX-License-Identifier: MIT OR Apache-2.0

//! ragsift - Retrieval-augmented question answering library
//!
//! Retrieves candidate passages from a vector index, drops near-duplicates
//! while keeping rank order, and hands the surviving passages to a generator.

pub mod config;
pub mod embedding;
pub mod errors;
pub mod generation;
pub mod ingest;
pub mod output;
pub mod pipeline;
pub mod retrieval;
pub mod selection;
pub mod utils;

pub use errors::RagError;
pub use pipeline::{run_rag, RagAnswer, RagParams, RagPipeline};
pub use retrieval::{Candidate, Retriever};
pub use selection::{DeduplicationSelector, SelectionConfig, SelectionResult};

// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end retrieval-augmented answering.
//!
//! [`RagPipeline`] wires the injected collaborators together:
//! embed the query, retrieve the top-k candidates, select a diverse subset,
//! assemble the context and ask the generator. The pipeline itself holds no
//! state between queries.

use serde::Serialize;
use tracing::info;

use crate::embedding::EmbeddingProvider;
use crate::errors::{RagError, Result};
use crate::generation::Generator;
use crate::retrieval::{Candidate, Retriever};
use crate::selection::{DeduplicationSelector, SelectionConfig, SelectionStats};

/// Per-query parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RagParams {
    /// Number of candidates requested from the retriever
    pub top_k: usize,
    /// Cosine similarity at or above which candidates are duplicates
    pub similarity_threshold: f32,
    /// Maximum number of passages passed to the generator
    pub max_results: usize,
    /// Embed all candidates in one batch before selection
    pub prefetch: bool,
}

impl Default for RagParams {
    fn default() -> Self {
        let selection = SelectionConfig::default();
        Self {
            top_k: crate::config::DEFAULT_TOP_K,
            similarity_threshold: selection.similarity_threshold,
            max_results: selection.max_results,
            prefetch: selection.prefetch,
        }
    }
}

impl RagParams {
    pub fn new(top_k: usize, similarity_threshold: f32, max_results: usize) -> Self {
        Self {
            top_k,
            similarity_threshold,
            max_results,
            prefetch: false,
        }
    }

    fn selection_config(&self) -> SelectionConfig {
        SelectionConfig::new(self.similarity_threshold, self.max_results)
            .with_prefetch(self.prefetch)
    }
}

/// Answer plus the passages it was generated from
#[derive(Debug, Clone, Serialize)]
pub struct RagAnswer {
    pub answer: String,
    /// Selected passages in slot order
    pub selected: Vec<Candidate>,
    /// Context string handed to the generator
    pub context: String,
    pub stats: SelectionStats,
}

/// Retrieval-augmented answering over injected collaborators
pub struct RagPipeline<'a> {
    embedder: &'a mut dyn EmbeddingProvider,
    retriever: &'a dyn Retriever,
    generator: &'a mut dyn Generator,
}

impl<'a> RagPipeline<'a> {
    pub fn new(
        embedder: &'a mut dyn EmbeddingProvider,
        retriever: &'a dyn Retriever,
        generator: &'a mut dyn Generator,
    ) -> Self {
        Self {
            embedder,
            retriever,
            generator,
        }
    }

    /// Answer `query`, returning the answer and the selected passages.
    pub fn run(&mut self, query: &str, params: RagParams) -> Result<RagAnswer> {
        if params.top_k < 1 {
            return Err(RagError::InvalidConfiguration(format!(
                "top_k must be at least 1, got {}",
                params.top_k
            )));
        }
        let selector = DeduplicationSelector::new(params.selection_config())?;

        let query_vector = self
            .embedder
            .embed_one(query)
            .map_err(RagError::embedding_unattributed)?;

        let candidates = self
            .retriever
            .retrieve(&query_vector, params.top_k)
            .map_err(RagError::Retrieval)?;
        info!(retrieved = candidates.len(), top_k = params.top_k, "retrieved candidates");

        let selection = selector.select_with_provider(&candidates, &mut *self.embedder)?;
        info!(
            selected = selection.selected.len(),
            replaced = selection.stats.replaced,
            discarded = selection.stats.discarded,
            "selected passages"
        );

        let answer = self
            .generator
            .generate(&selection.context, query)
            .map_err(RagError::Generation)?;

        Ok(RagAnswer {
            answer,
            selected: selection.selected,
            context: selection.context,
            stats: selection.stats,
        })
    }
}

/// Convenience wrapper around [`RagPipeline::run`].
pub fn run_rag(
    embedder: &mut dyn EmbeddingProvider,
    retriever: &dyn Retriever,
    generator: &mut dyn Generator,
    query: &str,
    params: RagParams,
) -> Result<RagAnswer> {
    RagPipeline::new(embedder, retriever, generator).run(query, params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{EchoGenerator, PromptTemplate};
    use crate::retrieval::StaticRetriever;
    use anyhow::anyhow;
    use std::cell::Cell;
    use std::collections::HashMap;

    /// Embeds through a fixed text -> vector table and counts calls.
    struct TableEmbedder {
        vectors: HashMap<String, Vec<f32>>,
        calls: usize,
    }

    impl TableEmbedder {
        fn new(entries: &[(&str, [f32; 2])]) -> Self {
            Self {
                vectors: entries
                    .iter()
                    .map(|(text, v)| (text.to_string(), v.to_vec()))
                    .collect(),
                calls: 0,
            }
        }
    }

    impl EmbeddingProvider for TableEmbedder {
        fn model_id(&self) -> &str {
            "table"
        }

        fn batch_size(&self) -> usize {
            16
        }

        fn embed_texts(&mut self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            self.calls += texts.len();
            texts
                .iter()
                .map(|t| {
                    self.vectors
                        .get(t)
                        .cloned()
                        .ok_or_else(|| anyhow!("cannot embed '{}'", t))
                })
                .collect()
        }
    }

    struct RecordingGenerator {
        contexts: Vec<String>,
    }

    impl Generator for RecordingGenerator {
        fn generate(&mut self, context: &str, query: &str) -> anyhow::Result<String> {
            self.contexts.push(context.to_string());
            Ok(format!("answer to {}", query))
        }
    }

    struct FailingRetriever {
        calls: Cell<usize>,
    }

    impl Retriever for FailingRetriever {
        fn retrieve(&self, _query: &[f32], _top_k: usize) -> anyhow::Result<Vec<Candidate>> {
            self.calls.set(self.calls.get() + 1);
            Err(anyhow!("index offline"))
        }
    }

    fn candidate(source: &str, text: &str, distance: f32) -> Candidate {
        Candidate::new(source, text, distance).unwrap()
    }

    #[test]
    fn test_run_selects_and_generates() {
        let mut embedder = TableEmbedder::new(&[
            ("query", [1.0, 0.0]),
            ("contract law", [1.0, 0.0]),
            ("contract law, article 2", [0.99, 0.05]),
            ("tort law", [0.0, 1.0]),
        ]);
        let retriever = StaticRetriever::new(vec![
            candidate("civil.txt", "contract law", 0.1),
            candidate("civil.txt", "contract law, article 2", 0.2),
            candidate("tort.txt", "tort law", 0.3),
        ]);
        let mut generator = RecordingGenerator { contexts: Vec::new() };

        let answer = run_rag(
            &mut embedder,
            &retriever,
            &mut generator,
            "query",
            RagParams::new(10, 0.8, 3),
        )
        .unwrap();

        assert_eq!(answer.answer, "answer to query");
        assert_eq!(answer.context, "contract law, article 2 tort law");
        assert_eq!(generator.contexts, vec![answer.context.clone()]);
        assert_eq!(answer.selected.len(), 2);
        assert!((answer.selected[0].distance - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_empty_retrieval_still_generates() {
        let mut embedder = TableEmbedder::new(&[("query", [1.0, 0.0])]);
        let retriever = StaticRetriever::new(Vec::new());
        let mut generator = EchoGenerator::new(PromptTemplate::new("{query}:{context}").unwrap());

        let answer = run_rag(
            &mut embedder,
            &retriever,
            &mut generator,
            "query",
            RagParams::default(),
        )
        .unwrap();

        assert!(answer.selected.is_empty());
        assert_eq!(answer.context, "");
        assert_eq!(answer.answer, "query:");
    }

    #[test]
    fn test_invalid_params_do_no_work() {
        let mut embedder = TableEmbedder::new(&[("query", [1.0, 0.0])]);
        let retriever = FailingRetriever { calls: Cell::new(0) };
        let mut generator = EchoGenerator::default();

        for params in [
            RagParams::new(0, 0.8, 3),
            RagParams::new(10, 1.2, 3),
            RagParams::new(10, 0.8, 0),
        ] {
            let err = run_rag(&mut embedder, &retriever, &mut generator, "query", params)
                .unwrap_err();
            assert!(matches!(err, RagError::InvalidConfiguration(_)));
        }
        assert_eq!(embedder.calls, 0);
        assert_eq!(retriever.calls.get(), 0);
    }

    #[test]
    fn test_retrieval_error_passes_through() {
        let mut embedder = TableEmbedder::new(&[("query", [1.0, 0.0])]);
        let retriever = FailingRetriever { calls: Cell::new(0) };
        let mut generator = EchoGenerator::default();

        let err = run_rag(
            &mut embedder,
            &retriever,
            &mut generator,
            "query",
            RagParams::default(),
        )
        .unwrap_err();
        assert!(matches!(err, RagError::Retrieval(_)));
        assert!(err.to_string().contains("index offline"));
    }

    #[test]
    fn test_candidate_embedding_error_aborts_run() {
        let mut embedder = TableEmbedder::new(&[("query", [1.0, 0.0]), ("known", [0.0, 1.0])]);
        let retriever = StaticRetriever::new(vec![
            candidate("a.txt", "known", 0.1),
            candidate("b.txt", "unknown", 0.2),
        ]);
        let mut generator = RecordingGenerator { contexts: Vec::new() };

        let err = run_rag(
            &mut embedder,
            &retriever,
            &mut generator,
            "query",
            RagParams::default(),
        )
        .unwrap_err();

        assert!(
            matches!(err, RagError::Embedding { source_id: Some(ref id), .. } if id == "b.txt")
        );
        assert!(generator.contexts.is_empty());
    }

    #[test]
    fn test_generation_error_passes_through() {
        struct Broken;
        impl Generator for Broken {
            fn generate(&mut self, _context: &str, _query: &str) -> anyhow::Result<String> {
                Err(anyhow!("model unavailable"))
            }
        }

        let mut embedder = TableEmbedder::new(&[("query", [1.0, 0.0])]);
        let retriever = StaticRetriever::new(Vec::new());
        let mut generator = Broken;

        let err = run_rag(
            &mut embedder,
            &retriever,
            &mut generator,
            "query",
            RagParams::default(),
        )
        .unwrap_err();
        assert!(matches!(err, RagError::Generation(_)));
    }
}

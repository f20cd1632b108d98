// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding module - embedding providers and the passage index
//!
//! Providers turn text into vectors; the SQLite-backed passage store keeps
//! passage vectors and answers nearest-neighbour queries.

pub mod provider;
pub mod storage;

pub use provider::{create_provider, CommandProvider, DummyProvider, EmbeddingProvider};
#[cfg(not(all(target_os = "macos", target_arch = "x86_64")))]
pub use provider::{FastEmbedConfig, FastEmbedder};
pub use storage::{Passage, PassageInput, PassageStore};

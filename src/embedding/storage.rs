// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-based passage index.
//!
//! Stores passages with their embedding vectors and serves exact
//! nearest-neighbour queries by squared L2 distance. Scoring runs in
//! parallel over all stored vectors; results are ordered by ascending
//! distance with insertion order breaking ties.

use anyhow::{bail, Context, Result};
use rayon::prelude::*;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::retrieval::{Candidate, Retriever};
use crate::utils::{INDEX_DIR, INDEX_FILE};

const META_MODEL: &str = "model";
const META_DIMENSION: &str = "dimension";

/// A stored passage.
#[derive(Debug, Clone)]
pub struct Passage {
    /// Row identifier, increasing in insertion order
    pub id: i64,
    /// Originating document (e.g. file path)
    pub source_id: String,
    /// Passage text
    pub text: String,
    /// blake3 hash of the passage text
    pub content_hash: String,
    /// Embedding vector
    pub embedding: Vec<f32>,
    /// Unix timestamp when this passage was stored
    pub created_at: i64,
}

/// Input passage data for bulk writes.
pub struct PassageInput<'a> {
    pub source_id: &'a str,
    pub text: &'a str,
    pub content_hash: &'a str,
    pub embedding: &'a [f32],
}

/// SQLite-based storage for passages and their embeddings.
///
/// Stores passages in `.ragsift/index.sqlite` by default.
pub struct PassageStore {
    conn: Connection,
    path: PathBuf,
}

impl PassageStore {
    /// Opens or creates a passage store at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        let store = Self { conn, path };
        store.init_schema()?;
        Ok(store)
    }

    /// Opens a passage store in the default location under `root`.
    pub fn open_default<P: AsRef<Path>>(root: P) -> Result<Self> {
        Self::open(root.as_ref().join(INDEX_DIR).join(INDEX_FILE))
    }

    fn init_schema(&self) -> Result<()> {
        self.conn
            .execute_batch(
                r#"
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS passages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_id TEXT NOT NULL,
                text TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                embedding BLOB NOT NULL,
                created_at INTEGER NOT NULL,
                UNIQUE (source_id, content_hash)
            );
            "#,
            )
            .context("Failed to initialize database schema")?;
        Ok(())
    }

    /// Returns the database path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records the embedding model and dimension, or checks them against
    /// what the index was built with.
    pub fn ensure_model(&self, model: &str, dimension: usize) -> Result<()> {
        match (self.model()?, self.dimension()?) {
            (None, None) => {
                self.set_meta(META_MODEL, model)?;
                self.set_meta(META_DIMENSION, &dimension.to_string())?;
                Ok(())
            }
            (_, stored_dim) => {
                self.check_model(model)?;
                if let Some(stored) = stored_dim {
                    if stored != dimension {
                        bail!(
                            "Index dimension is {} but the embedder produces {}; rebuild with --force",
                            stored,
                            dimension
                        );
                    }
                }
                Ok(())
            }
        }
    }

    /// Fails if the index was built with a model other than `model`.
    pub fn check_model(&self, model: &str) -> Result<()> {
        if let Some(stored) = self.model()? {
            if stored != model {
                bail!(
                    "Index was built with model '{}' but '{}' is configured; rebuild with --force",
                    stored,
                    model
                );
            }
        }
        Ok(())
    }

    /// Embedding dimension recorded for this index, if any.
    pub fn dimension(&self) -> Result<Option<usize>> {
        self.get_meta(META_DIMENSION)?
            .map(|raw| {
                raw.parse::<usize>()
                    .with_context(|| format!("Invalid stored dimension: {}", raw))
            })
            .transpose()
    }

    /// Model identifier recorded for this index, if any.
    pub fn model(&self) -> Result<Option<String>> {
        self.get_meta(META_MODEL)
    }

    /// Inserts passages in one transaction; returns how many rows were added.
    ///
    /// Passages whose `(source_id, content_hash)` already exists are ignored.
    pub fn insert_passages(&mut self, passages: &[PassageInput<'_>]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let inserted = Self::insert_rows(&tx, passages)?;
        tx.commit().context("Failed to commit passages")?;
        Ok(inserted)
    }

    /// Replaces every passage and the model metadata in one transaction.
    ///
    /// The previous contents stay intact if any step fails.
    pub fn replace_all(
        &mut self,
        model: &str,
        dimension: usize,
        passages: &[PassageInput<'_>],
    ) -> Result<usize> {
        let tx = self.conn.transaction()?;
        tx.execute_batch("DELETE FROM passages; DELETE FROM meta;")
            .context("Failed to clear passage index")?;
        {
            let mut stmt = tx.prepare("INSERT INTO meta (key, value) VALUES (?1, ?2)")?;
            stmt.execute(params![META_MODEL, model])?;
            stmt.execute(params![META_DIMENSION, dimension.to_string()])?;
        }
        let inserted = Self::insert_rows(&tx, passages)?;
        tx.commit().context("Failed to commit rebuilt index")?;
        Ok(inserted)
    }

    fn insert_rows(conn: &Connection, passages: &[PassageInput<'_>]) -> Result<usize> {
        let now = unix_now();
        let mut stmt = conn.prepare(
            r#"
            INSERT OR IGNORE INTO passages (source_id, text, content_hash, embedding, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )?;
        let mut inserted = 0usize;
        for passage in passages {
            inserted += stmt.execute(params![
                passage.source_id,
                passage.text,
                passage.content_hash,
                Self::embedding_to_blob(passage.embedding),
                now,
            ])?;
        }
        Ok(inserted)
    }

    /// Checks whether a passage with this source and content hash is stored.
    pub fn contains(&self, source_id: &str, content_hash: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM passages WHERE source_id = ?1 AND content_hash = ?2",
                params![source_id, content_hash],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Loads every stored passage in insertion order.
    pub fn passages(&self) -> Result<Vec<Passage>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, source_id, text, content_hash, embedding, created_at
            FROM passages
            ORDER BY id
            "#,
        )?;

        let rows = stmt
            .query_map([], |row| {
                let blob: Vec<u8> = row.get(4)?;
                Ok(Passage {
                    id: row.get(0)?,
                    source_id: row.get(1)?,
                    text: row.get(2)?,
                    content_hash: row.get(3)?,
                    embedding: Self::blob_to_embedding(&blob),
                    created_at: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Exact nearest-neighbour search by squared L2 distance.
    ///
    /// Returns at most `top_k` candidates, closest first.
    pub fn search(&self, query_embedding: &[f32], top_k: usize) -> Result<Vec<Candidate>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        if let Some(dimension) = self.dimension()? {
            if dimension != query_embedding.len() {
                bail!(
                    "Query embedding has dimension {} but the index stores {}",
                    query_embedding.len(),
                    dimension
                );
            }
        }

        let passages = self.passages()?;
        let mut scored: Vec<(i64, f32, usize)> = passages
            .par_iter()
            .enumerate()
            .map(|(idx, passage)| {
                if passage.embedding.len() != query_embedding.len() {
                    bail!(
                        "Stored passage {} has dimension {}, expected {}",
                        passage.id,
                        passage.embedding.len(),
                        query_embedding.len()
                    );
                }
                Ok((passage.id, squared_l2(query_embedding, &passage.embedding), idx))
            })
            .collect::<Result<Vec<_>>>()?;

        scored.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(_, distance, idx)| {
                let passage = &passages[idx];
                Candidate {
                    source_id: passage.source_id.clone(),
                    text: passage.text.clone(),
                    distance,
                }
            })
            .collect())
    }

    /// Counts stored passages.
    pub fn count_passages(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM passages", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Removes all passages and metadata.
    pub fn clear_all(&self) -> Result<()> {
        self.conn
            .execute_batch("DELETE FROM passages; DELETE FROM meta;")
            .context("Failed to clear passage index")?;
        Ok(())
    }

    /// Gets metadata value by key.
    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to get meta")?;
        Ok(value)
    }

    /// Sets metadata value.
    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO meta (key, value)
            VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
            params![key, value],
        )?;
        Ok(())
    }

    /// Converts an embedding vector to a compact blob.
    fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    /// Converts a blob back to an embedding vector.
    fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
        blob.chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect()
    }
}

impl Retriever for PassageStore {
    fn retrieve(&self, query_vector: &[f32], top_k: usize) -> Result<Vec<Candidate>> {
        self.search(query_vector, top_k)
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

// SPDX-License-Identifier: MIT OR Apache-2.0

//! Utility functions for ragsift

use std::path::{Path, PathBuf};

/// The name of the index directory
pub const INDEX_DIR: &str = ".ragsift";

/// The passage database file inside the index directory
pub const INDEX_FILE: &str = "index.sqlite";

/// Find the nearest directory holding a `.ragsift` index by walking up from `start`.
pub fn find_index_root(start: impl AsRef<Path>) -> Option<PathBuf> {
    let mut current = start.as_ref().to_path_buf();
    if let Ok(canonical) = current.canonicalize() {
        current = canonical;
    }

    loop {
        if current.join(INDEX_DIR).join(INDEX_FILE).is_file() {
            return Some(current);
        }
        if !current.pop() {
            return None;
        }
    }
}

/// Get the root directory that contains the index.
/// Falls back to the given path if no index is found.
pub fn get_root_with_index(path: impl AsRef<Path>) -> PathBuf {
    find_index_root(&path).unwrap_or_else(|| path.as_ref().to_path_buf())
}

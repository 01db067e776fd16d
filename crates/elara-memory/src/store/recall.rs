//! Semantic retrieval over the vector index.

use std::collections::HashMap;

use tracing::debug;

use crate::embedding::encode_checked;
use crate::error::Result;
use crate::types::{Category, ContextMatch, MemoryEntry};

use super::MemoryStore;

/// Over-fetch factor applied when a category filter is active.
///
/// Filtering happens after the nearest-neighbor search, so the index is asked
/// for `k * FILTER_OVERFETCH` hits to leave headroom for discarded ones. A
/// heavily filtered store can still return fewer than `k` matches.
const FILTER_OVERFETCH: usize = 4;

impl MemoryStore {
    /// The `k` entries most semantically similar to `query_text`.
    ///
    /// Optionally restricted to one category. Results are ordered by
    /// ascending distance; an empty store yields an empty vec.
    pub fn relevant_context(
        &self,
        query_text: &str,
        k: usize,
        category: Option<Category>,
    ) -> Result<Vec<MemoryEntry>> {
        Ok(self
            .search(query_text, category, k)?
            .into_iter()
            .map(|m| m.entry)
            .collect())
    }

    /// Like [`relevant_context`](Self::relevant_context), but each result
    /// carries its distance to the query embedding.
    pub fn search(
        &self,
        query_text: &str,
        category: Option<Category>,
        k: usize,
    ) -> Result<Vec<ContextMatch>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        // Encoding happens before any lock is taken.
        let query = encode_checked(self.provider.as_ref(), query_text)?;

        let fetch_k = if category.is_some() {
            k.saturating_mul(FILTER_OVERFETCH)
        } else {
            k
        };
        let hits = {
            let index = self.index.lock().unwrap();
            index.backend.search(&query, fetch_k)
        };
        if hits.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = hits.iter().map(|h| h.id).collect();
        let distances: HashMap<i64, f32> = hits.iter().map(|h| (h.id, h.distance)).collect();

        // fetch_by_ids preserves hit order, so matches stay sorted by
        // ascending distance.
        let entries = self.fetch_by_ids(&ids)?;
        let mut matches: Vec<ContextMatch> = entries
            .into_iter()
            .filter(|e| category.is_none_or(|c| e.category == c))
            .map(|entry| ContextMatch {
                distance: distances[&entry.id],
                entry,
            })
            .collect();
        matches.truncate(k);

        debug!(
            requested = k,
            returned = matches.len(),
            filtered = category.is_some(),
            "context retrieval"
        );
        Ok(matches)
    }
}

//! Similarity search over the embedding store
//!
//! [`ExactSearch`] scores every eligible chunk against the query. This is
//! O(n) in the number of stored chunks, which is fine for a personal library;
//! an approximate index can implement [`SearchStrategy`] with the same
//! contract.

use super::embedding::cosine_similarity;
use super::store::{EmbeddingStore, FilterMode, StoredChunk};
use crate::core::error::Result;

/// A scored chunk
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub chunk_id: i64,
    pub book_id: i64,
    pub file_name: String,
    pub page_number: i64,
    pub score: f32,
    pub text: String,
}

impl From<(StoredChunk, f32)> for SearchHit {
    fn from((chunk, score): (StoredChunk, f32)) -> Self {
        Self {
            chunk_id: chunk.id,
            book_id: chunk.book_id,
            file_name: chunk.file_name,
            page_number: chunk.page_number,
            score,
            text: chunk.text,
        }
    }
}

/// Finds the chunks most similar to a query vector
pub trait SearchStrategy: Send + Sync {
    /// Up to `top_n` hits, best first
    ///
    /// Only chunks passing `filter` are considered. Equal scores keep the
    /// store's scan order.
    fn search(
        &self,
        store: &EmbeddingStore,
        query: &[f32],
        filter: FilterMode,
        top_n: usize,
    ) -> Result<Vec<SearchHit>>;
}

/// Brute-force scan of every eligible chunk
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactSearch;

impl SearchStrategy for ExactSearch {
    fn search(
        &self,
        store: &EmbeddingStore,
        query: &[f32],
        filter: FilterMode,
        top_n: usize,
    ) -> Result<Vec<SearchHit>> {
        let candidates = store.eligible_chunks(filter)?;
        tracing::debug!(candidates = candidates.len(), ?filter, "scoring chunks");
        rank(candidates, query, top_n)
    }
}

/// Score candidates and keep the best `top_n`
pub fn rank(candidates: Vec<StoredChunk>, query: &[f32], top_n: usize) -> Result<Vec<SearchHit>> {
    let mut hits = Vec::with_capacity(candidates.len());
    for chunk in candidates {
        let score = cosine_similarity(query, &chunk.embedding)?;
        hits.push(SearchHit::from((chunk, score)));
    }

    // sort_by is stable: ties stay in scan order
    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    hits.truncate(top_n);

    Ok(hits)
}

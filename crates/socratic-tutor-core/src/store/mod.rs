//! Vector store abstraction.
//!
//! The [`VectorStore`] trait is everything the ingestion and chat pipelines
//! need from persistence: upsert a document's chunks with their vectors,
//! search by similarity within one document, and enumerate documents.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::cmp::Ordering;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{Chunk, SearchHit};

/// Default number of hits returned by a chat retrieval.
pub const DEFAULT_TOP_K: usize = 5;

/// Persistent `(vector, text, source id)` records with similarity search.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](VectorStore::upsert) | Insert or overwrite a document's chunks |
/// | [`search`](VectorStore::search) | Top-k cosine search, optionally filtered to one document |
/// | [`list_sources`](VectorStore::list_sources) | Sorted distinct source ids |
/// | [`chunk_count`](VectorStore::chunk_count) | Stored chunks for one document |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or overwrite the chunks of `source_id`.
    ///
    /// Keyed by chunk id, so repeating an upsert leaves the store size
    /// unchanged. Chunks of `source_id` whose sequence index is at or past
    /// `chunks.len()` are removed, which keeps a shorter re-ingestion from
    /// leaving stale tails behind. Returns the number of chunks written.
    async fn upsert(
        &self,
        source_id: &str,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<usize, StoreError>;

    /// The `top_k` chunks most similar to `query`, best first.
    ///
    /// When `source_id` is given, only that document's chunks are
    /// candidates; an unknown source yields an empty list.
    async fn search(
        &self,
        query: &[f32],
        source_id: Option<&str>,
        top_k: usize,
    ) -> Result<Vec<SearchHit>, StoreError>;

    async fn list_sources(&self) -> Result<Vec<String>, StoreError>;

    async fn chunk_count(&self, source_id: &str) -> Result<usize, StoreError>;
}

/// Shared upsert precondition: one vector per chunk, all owned by `source_id`.
pub fn check_upsert(source_id: &str, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<(), StoreError> {
    if chunks.len() != vectors.len() {
        return Err(StoreError::VectorCountMismatch {
            source_id: source_id.to_string(),
            chunks: chunks.len(),
            vectors: vectors.len(),
        });
    }
    if let Some(stray) = chunks.iter().find(|c| c.source_id != source_id) {
        return Err(StoreError::Unavailable(format!(
            "chunk {} belongs to {}, not {}",
            stray.id, stray.source_id, source_id
        )));
    }
    Ok(())
}

/// Order hits by descending score, then chunk id ascending, and keep `top_k`.
pub fn rank_hits(mut hits: Vec<SearchHit>, top_k: usize) -> Vec<SearchHit> {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    hits.truncate(top_k);
    hits
}

//! In-memory [`VectorStore`] for tests and WASM targets.
//!
//! Records live in a `BTreeMap` keyed by chunk id behind a `std::sync::RwLock`.
//! Search is brute-force cosine similarity over every stored vector.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::StoreError;
use crate::models::{Chunk, ChunkRecord, SearchHit};

use super::{check_upsert, rank_hits, VectorStore};

#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<BTreeMap<String, ChunkRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.records.read().map_err(poisoned)?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Unavailable("in-memory store lock poisoned".to_string())
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn upsert(
        &self,
        source_id: &str,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<usize, StoreError> {
        check_upsert(source_id, chunks, vectors)?;
        let keep = chunks.len() as i64;
        let mut records = self.records.write().map_err(poisoned)?;
        records.retain(|_, r| r.chunk.source_id != source_id || r.chunk.sequence_index < keep);
        for (chunk, vector) in chunks.iter().zip(vectors) {
            records.insert(
                chunk.id.clone(),
                ChunkRecord {
                    chunk: chunk.clone(),
                    embedding: vector.clone(),
                },
            );
        }
        Ok(chunks.len())
    }

    async fn search(
        &self,
        query: &[f32],
        source_id: Option<&str>,
        top_k: usize,
    ) -> Result<Vec<SearchHit>, StoreError> {
        let records = self.records.read().map_err(poisoned)?;
        let hits = records
            .values()
            .filter(|r| source_id.map_or(true, |s| r.chunk.source_id == s))
            .map(|r| SearchHit {
                chunk_id: r.chunk.id.clone(),
                source_id: r.chunk.source_id.clone(),
                sequence_index: r.chunk.sequence_index,
                text: r.chunk.text.clone(),
                score: cosine_similarity(query, &r.embedding) as f64,
            })
            .collect();
        Ok(rank_hits(hits, top_k))
    }

    async fn list_sources(&self) -> Result<Vec<String>, StoreError> {
        let records = self.records.read().map_err(poisoned)?;
        let sources: BTreeSet<&str> = records.values().map(|r| r.chunk.source_id.as_str()).collect();
        Ok(sources.into_iter().map(str::to_string).collect())
    }

    async fn chunk_count(&self, source_id: &str) -> Result<usize, StoreError> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(records
            .values()
            .filter(|r| r.chunk.source_id == source_id)
            .count())
    }
}

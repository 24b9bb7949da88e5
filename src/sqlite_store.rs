//! SQLite-backed [`VectorStore`].
//!
//! Chunks and their embeddings share one `chunks` table, keyed by
//! `(collection, id)`. Search is brute-force cosine similarity over the
//! stored f32 blobs of the candidate rows, which is plenty for a handful
//! of course documents.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use socratic_tutor_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use socratic_tutor_core::error::StoreError;
use socratic_tutor_core::models::{Chunk, SearchHit};
use socratic_tutor_core::store::{check_upsert, rank_hits, VectorStore};

pub struct SqliteStore {
    pool: SqlitePool,
    collection: String,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, collection: impl Into<String>) -> Self {
        Self {
            pool,
            collection: collection.into(),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn upsert(
        &self,
        source_id: &str,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<usize, StoreError> {
        check_upsert(source_id, chunks, vectors)?;
        let now = chrono::Utc::now().timestamp();

        let mut tx = self.pool.begin().await.map_err(StoreError::unavailable)?;

        for (chunk, vector) in chunks.iter().zip(vectors) {
            sqlx::query(
                r#"
                INSERT INTO chunks (collection, id, source_id, sequence_index, text,
                                    heading_context, hash, embedding, dims, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(collection, id) DO UPDATE SET
                    text = excluded.text,
                    heading_context = excluded.heading_context,
                    hash = excluded.hash,
                    embedding = excluded.embedding,
                    dims = excluded.dims,
                    created_at = excluded.created_at
                "#,
            )
            .bind(&self.collection)
            .bind(&chunk.id)
            .bind(&chunk.source_id)
            .bind(chunk.sequence_index)
            .bind(&chunk.text)
            .bind(&chunk.heading_context)
            .bind(&chunk.hash)
            .bind(vec_to_blob(vector))
            .bind(vector.len() as i64)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::unavailable)?;
        }

        // Drop the tail left over from a longer previous ingestion
        sqlx::query(
            "DELETE FROM chunks WHERE collection = ? AND source_id = ? AND sequence_index >= ?",
        )
        .bind(&self.collection)
        .bind(source_id)
        .bind(chunks.len() as i64)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::unavailable)?;

        tx.commit().await.map_err(StoreError::unavailable)?;
        Ok(chunks.len())
    }

    async fn search(
        &self,
        query: &[f32],
        source_id: Option<&str>,
        top_k: usize,
    ) -> Result<Vec<SearchHit>, StoreError> {
        let rows = match source_id {
            Some(source_id) => {
                sqlx::query(
                    r#"
                    SELECT id, source_id, sequence_index, text, embedding
                    FROM chunks
                    WHERE collection = ? AND source_id = ?
                    "#,
                )
                .bind(&self.collection)
                .bind(source_id)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT id, source_id, sequence_index, text, embedding
                    FROM chunks
                    WHERE collection = ?
                    "#,
                )
                .bind(&self.collection)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(StoreError::unavailable)?;

        let hits = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                SearchHit {
                    chunk_id: row.get("id"),
                    source_id: row.get("source_id"),
                    sequence_index: row.get("sequence_index"),
                    text: row.get("text"),
                    score: cosine_similarity(query, &blob_to_vec(&blob)) as f64,
                }
            })
            .collect();

        Ok(rank_hits(hits, top_k))
    }

    async fn list_sources(&self) -> Result<Vec<String>, StoreError> {
        sqlx::query_scalar(
            "SELECT DISTINCT source_id FROM chunks WHERE collection = ? ORDER BY source_id ASC",
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::unavailable)
    }

    async fn chunk_count(&self, source_id: &str) -> Result<usize, StoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE collection = ? AND source_id = ?")
                .bind(&self.collection)
                .bind(source_id)
                .fetch_one(&self.pool)
                .await
                .map_err(StoreError::unavailable)?;
        Ok(count as usize)
    }
}

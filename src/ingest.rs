//! Ingestion pipeline: PDF → text → chunks → embeddings → vector store.
//!
//! Extraction and chunking are CPU-bound and run under `spawn_blocking`;
//! they are not retried. Embedding (batched) and the store upsert are
//! network- or lock-bound and go through the configured [`RetryPolicy`](crate::retry::RetryPolicy).
//!
//! The document's source id is its file name, so re-ingesting the same
//! file overwrites its chunks in place.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

use socratic_tutor_core::error::{EmbeddingError, ExtractionError, StoreError, ValidationError};
use socratic_tutor_core::models::Chunk;

use crate::config::Config;
use crate::extract::extract_pdf_text;
use crate::services::Services;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("ingestion task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub source_id: String,
    pub chars: usize,
    pub chunks: usize,
    /// Chunks that carry a heading prefix.
    pub headed_chunks: usize,
    pub elapsed_ms: u64,
}

/// Source id for a document path: its file name.
pub fn source_id_for(path: &Path) -> Result<String, ValidationError> {
    path.file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| ValidationError::BadFileName(path.display().to_string()))
}

/// Reject anything without a `.pdf` extension (case-insensitive).
pub fn ensure_pdf_name(name: &str) -> Result<(), ValidationError> {
    let is_pdf = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
    if is_pdf {
        Ok(())
    } else {
        Err(ValidationError::NotPdf(name.to_string()))
    }
}

/// Reduce an uploaded file name to a safe base name.
///
/// Directory components are dropped, whitespace becomes `_`, anything
/// outside `[A-Za-z0-9._-]` is removed, and leading dots are stripped so
/// the result can never escape the upload directory or be hidden.
pub fn sanitize_file_name(name: &str) -> Result<String, ValidationError> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        return Err(ValidationError::BadFileName(name.to_string()));
    }
    Ok(cleaned)
}

pub async fn ingest_pdf(services: &Services, path: &Path) -> Result<IngestReport, IngestError> {
    let source_id = source_id_for(path)?;
    ensure_pdf_name(&source_id)?;
    let started = Instant::now();

    let owned_path = path.to_path_buf();
    let text = tokio::task::spawn_blocking(move || extract_pdf_text(&owned_path))
        .await
        .map_err(|e| IngestError::Task(e.to_string()))??;

    debug!(source_id = %source_id, chars = text.chars().count(), "extracted");
    let mut report = ingest_text(services, &source_id, text).await?;
    report.elapsed_ms = started.elapsed().as_millis() as u64;
    Ok(report)
}

/// Chunk, embed, and store already-extracted text under `source_id`.
pub async fn ingest_text(
    services: &Services,
    source_id: &str,
    text: String,
) -> Result<IngestReport, IngestError> {
    let started = Instant::now();
    let chars = text.chars().count();

    let chunker = services.chunker.clone();
    let sid = source_id.to_string();
    let chunks = tokio::task::spawn_blocking(move || chunker.chunk(&sid, &text))
        .await
        .map_err(|e| IngestError::Task(e.to_string()))?;

    if chunks.is_empty() {
        warn!(source_id = %source_id, "no text extracted; is this a scanned PDF?");
    }

    let vectors = embed_chunks(services, &chunks).await?;

    let store = &services.store;
    services
        .retry
        .run("upsert", || store.upsert(source_id, &chunks, &vectors))
        .await?;

    let report = IngestReport {
        source_id: source_id.to_string(),
        chars,
        chunks: chunks.len(),
        headed_chunks: chunks.iter().filter(|c| c.heading_context.is_some()).count(),
        elapsed_ms: started.elapsed().as_millis() as u64,
    };
    info!(
        source_id = %report.source_id,
        chunks = report.chunks,
        headed_chunks = report.headed_chunks,
        "ingested"
    );
    Ok(report)
}

/// `tutor ingest`: index one or more PDFs and print a summary per file.
///
/// A failing file is reported and skipped; the command fails at the end if
/// any file did.
pub async fn run_ingest(
    config: &Config,
    paths: &[PathBuf],
    collection: Option<String>,
) -> anyhow::Result<()> {
    let mut config = config.clone();
    if let Some(collection) = collection {
        config.retrieval.collection = collection;
    }
    let services = Services::open(&config).await?;

    let mut failed = 0usize;
    for path in paths {
        match ingest_pdf(&services, path).await {
            Ok(report) => {
                println!("ingest {}", report.source_id);
                println!("  chars: {}", report.chars);
                println!(
                    "  chunks: {} ({} with heading context)",
                    report.chunks, report.headed_chunks
                );
                println!("  collection: {}", config.retrieval.collection);
                println!("  elapsed: {}ms", report.elapsed_ms);
            }
            Err(e) => {
                failed += 1;
                eprintln!("ingest {} failed: {}", path.display(), e);
            }
        }
    }

    services.close().await;
    if failed > 0 {
        anyhow::bail!("{} of {} documents failed to ingest", failed, paths.len());
    }
    Ok(())
}

async fn embed_chunks(services: &Services, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let mut vectors = Vec::with_capacity(chunks.len());
    let batch_size = services.embed_batch_size.max(1);
    let embedder = &services.embedder;

    for batch in chunks.chunks(batch_size) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let texts = &texts;
        let batch_vectors = services
            .retry
            .run("embed", || embedder.embed(texts))
            .await?;
        if batch_vectors.len() != batch.len() {
            return Err(EmbeddingError::InvalidResponse(format!(
                "expected {} vectors, got {}",
                batch.len(),
                batch_vectors.len()
            )));
        }
        vectors.extend(batch_vectors);
    }
    Ok(vectors)
}

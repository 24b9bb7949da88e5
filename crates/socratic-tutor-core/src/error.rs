//! Error kinds shared by every stage of the ingestion and chat pipelines.
//!
//! | Kind | Raised by | Caller policy |
//! |------|-----------|---------------|
//! | [`ExtractionError`] | PDF text extraction | fatal for that ingestion |
//! | [`EmbeddingError`] | embedding providers | retryable when [`EmbeddingError::is_retryable`] |
//! | [`StoreError`] | vector store adapters | retry writes, degrade reads to empty |
//! | [`GenerationError`] | text-generation providers | replaced by a fallback message |
//! | [`ValidationError`] | request validation | reported as 400, no side effects |

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("cannot open {path}: {message}")]
    Open { path: String, message: String },
    #[error("{0} is not a PDF document")]
    NotPdf(String),
    #[error("PDF extraction failed: {0}")]
    Parse(String),
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding provider is disabled")]
    Disabled,
    #[error("embedding request failed: {0}")]
    Transport(String),
    #[error("embedding API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),
    #[error("embedding model failed: {0}")]
    Model(String),
}

impl EmbeddingError {
    /// Network failures, rate limiting, and server errors are worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            EmbeddingError::Transport(_) => true,
            EmbeddingError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("vector store unavailable: {0}")]
    Unavailable(String),
    #[error("{chunks} chunks but {vectors} vectors supplied for {source_id}")]
    VectorCountMismatch {
        source_id: String,
        chunks: usize,
        vectors: usize,
    },
}

impl StoreError {
    pub fn unavailable(err: impl std::fmt::Display) -> Self {
        StoreError::Unavailable(err.to_string())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation provider is disabled")]
    Disabled,
    #[error("generation request failed: {0}")]
    Transport(String),
    #[error("generation API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("malformed generation response: {0}")]
    Malformed(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("invalid file type for {0}: only .pdf uploads are accepted")]
    NotPdf(String),
    #[error("invalid file name: {0}")]
    BadFileName(String),
    #[error("prompt template is missing the {0} placeholder")]
    MissingPlaceholder(&'static str),
    #[error("history entry {0} must be {{\"role\", \"text\"}} or {{\"user\", \"bot\"}}")]
    BadHistoryEntry(usize),
}

//! Core data models used throughout Socratic Tutor.
//!
//! These types represent the chunks, search hits, and conversation turns
//! that flow through the ingestion and chat pipelines.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A bounded slice of document text, tagged with the heading it falls under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Deterministic id derived from `source_id` and `sequence_index`.
    pub id: String,
    pub source_id: String,
    pub sequence_index: i64,
    pub text: String,
    pub heading_context: Option<String>,
    /// SHA-256 of `text`.
    pub hash: String,
}

impl Chunk {
    pub fn new(
        source_id: &str,
        sequence_index: i64,
        text: &str,
        heading_context: Option<&str>,
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        let hash = format!("{:x}", hasher.finalize());

        Chunk {
            id: chunk_id(source_id, sequence_index),
            source_id: source_id.to_string(),
            sequence_index,
            text: text.to_string(),
            heading_context: heading_context.map(str::to_string),
            hash,
        }
    }
}

/// Stable chunk id: UUIDv5 over `"{source_id}#{sequence_index}"`.
///
/// Re-ingesting a document reproduces the same ids, which is what makes
/// store upserts overwrite instead of duplicate.
pub fn chunk_id(source_id: &str, sequence_index: i64) -> String {
    let name = format!("{}#{}", source_id, sequence_index);
    Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes()).to_string()
}

/// A chunk paired with its embedding, ready for [`VectorStore::upsert`](crate::store::VectorStore::upsert).
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
}

/// A ranked chunk returned from similarity search.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub chunk_id: String,
    pub source_id: String,
    pub sequence_index: i64,
    pub text: String,
    /// Cosine similarity in `[-1.0, 1.0]`.
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Tutor,
}

impl Role {
    /// Label used when rendering history into the prompt.
    pub fn label(self) -> &'static str {
        match self {
            Role::Student => "Student",
            Role::Tutor => "Tutor",
        }
    }
}

/// One message of the caller-supplied conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
}

impl ConversationTurn {
    pub fn student(text: impl Into<String>) -> Self {
        Self {
            role: Role::Student,
            text: text.into(),
        }
    }

    pub fn tutor(text: impl Into<String>) -> Self {
        Self {
            role: Role::Tutor,
            text: text.into(),
        }
    }
}

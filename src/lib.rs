//! # Socratic Tutor
//!
//! A retrieval-grounded tutoring service. PDFs are extracted, split into
//! heading-aware chunks, embedded, and stored per document; questions are
//! answered with guiding questions built from the closest chunks.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────┐   ┌──────────────┐   ┌──────────────┐
//! │   PDF   │──▶│ Chunk+Embed  │──▶│    SQLite    │
//! │ extract │   │ (core crate) │   │ chunks+vecs  │
//! └─────────┘   └──────────────┘   └──────┬───────┘
//!                                         │
//!                 ┌───────────────────────┤
//!                 ▼                       ▼
//!           ┌───────────┐          ┌─────────────┐
//!           │ Responder │◀─────────│ CLI / HTTP  │
//!           │ +Generator│          │   (tutor)   │
//!           └───────────┘          └─────────────┘
//! ```
//!
//! Chunking, prompt rendering, ranking and the responder live in
//! `socratic-tutor-core`; this crate wires them to SQLite, HTTP providers
//! and the axum server.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] / [`migrate`] | Database connection and schema |
//! | [`extract`] | PDF text extraction |
//! | [`embedding`] | Embedding providers |
//! | [`generation`] | Language model providers |
//! | [`sqlite_store`] | SQLite-backed vector store |
//! | [`ingest`] | Extract → chunk → embed → store pipeline |
//! | [`jobs`] | Background ingestion jobs |
//! | [`chat_log`] | Conversation logging sinks |
//! | [`services`] | Shared handles built from config |
//! | [`server`] | HTTP API |

pub mod chat_cmd;
pub mod chat_log;
pub mod config;
pub mod db;
pub mod documents;
pub mod embedding;
pub mod extract;
pub mod generation;
pub mod ingest;
pub mod jobs;
pub mod migrate;
pub mod retry;
pub mod search;
pub mod server;
pub mod services;
pub mod sqlite_store;

//! # Socratic Tutor Core
//!
//! Shared, WASM-safe logic for Socratic Tutor: data models, heading-aware
//! chunking, the embedding / generation / vector-store traits, the prompt
//! template, and the retrieval-augmented responder.
//!
//! This crate contains no tokio, sqlx, filesystem I/O, or other
//! native-only dependencies. Concrete adapters (SQLite store, HTTP model
//! providers, PDF extraction) live in the `socratic-tutor` app crate.

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod models;
pub mod prompt;
pub mod responder;
pub mod store;

//! Text-generation trait.
//!
//! The responder hands a fully rendered prompt to a [`Generator`] and
//! expects plain text back. Providers (Gemini, Ollama) live in the app crate.

use async_trait::async_trait;

use crate::error::GenerationError;

#[async_trait]
pub trait Generator: Send + Sync {
    /// Model identifier, for logs.
    fn model_name(&self) -> &str;
    /// Generate a completion for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

//! Configuration parsing and validation.
//!
//! Socratic Tutor is configured via a TOML file (default:
//! `config/tutor.toml`). Every section except `[db]` is optional and falls
//! back to defaults.
//!
//! # Example Configuration
//!
//! ```toml
//! [db]
//! path = "./data/tutor.sqlite"
//!
//! [chunking]
//! chunk_size = 1000
//! chunk_overlap = 100
//! profile = "legal"
//!
//! [chunking.profiles.syllabus]
//! heading_patterns = ['^(?i)unit\s+\d+']
//!
//! [retrieval]
//! top_k = 5
//! collection = "socratic_collection"
//!
//! [embedding]
//! provider = "local"          # "local", "openai", "ollama", "hashed", or "disabled"
//! model = "all-minilm-l6-v2"
//!
//! [generation]
//! provider = "gemini"         # "gemini", "ollama", or "disabled"
//! model = "gemini-pro-latest"
//!
//! [ingest]
//! max_attempts = 3
//! backoff_ms = 500
//!
//! [server]
//! bind = "127.0.0.1:5000"
//! upload_dir = "./uploads"
//!
//! [chat_log]
//! sink = "sqlite"             # "sqlite", "jsonl", or "disabled"
//! ```
//!
//! Secrets are never read from the file: `GOOGLE_API_KEY` and
//! `OPENAI_API_KEY` come from the environment (a `.env` file is loaded at
//! startup).

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use socratic_tutor_core::chunk::{HeadingChunker, HeadingPatterns};
use socratic_tutor_core::prompt::{
    PromptTemplate, ReplyMessages, DEFAULT_FALLBACK_MESSAGE, DEFAULT_NO_CONTEXT_MESSAGE,
};

/// Top-level configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub chat_log: ChatLogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    /// Heading profile: `"legal"`, `"none"`, or a key of `profiles`.
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default)]
    pub profiles: HashMap<String, HeadingProfile>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HeadingProfile {
    pub heading_patterns: Vec<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            profile: default_profile(),
            profiles: HashMap::new(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    100
}
fn default_profile() -> String {
    "legal".to_string()
}

impl ChunkingConfig {
    /// Compile the active heading profile.
    pub fn heading_patterns(&self) -> Result<HeadingPatterns> {
        if let Some(profile) = self.profiles.get(&self.profile) {
            return HeadingPatterns::from_patterns(&profile.heading_patterns).with_context(|| {
                format!("Invalid heading pattern in profile '{}'", self.profile)
            });
        }
        match self.profile.as_str() {
            "legal" => Ok(HeadingPatterns::legal()),
            "none" => Ok(HeadingPatterns::none()),
            other => bail!(
                "Unknown chunking profile: '{}'. Define [chunking.profiles.{}] or use legal or none.",
                other,
                other
            ),
        }
    }

    pub fn chunker(&self) -> Result<HeadingChunker> {
        Ok(HeadingChunker::new(
            self.heading_patterns()?,
            self.chunk_size,
            self.chunk_overlap,
        ))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Namespace inside the vector store.
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            collection: default_collection(),
        }
    }
}

fn default_top_k() -> usize {
    5
}
fn default_collection() -> String {
    "socratic_collection".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Inputs longer than this are truncated before embedding.
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            timeout_secs: default_timeout_secs(),
            max_input_chars: default_max_input_chars(),
        }
    }
}

fn default_embedding_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_input_chars() -> usize {
    8000
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
    /// Replaces the built-in Socratic template when set.
    #[serde(default)]
    pub prompt_template_path: Option<PathBuf>,
    #[serde(default = "default_no_context_message")]
    pub no_context_message: String,
    #[serde(default = "default_fallback_message")]
    pub fallback_message: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: default_generation_model(),
            url: None,
            timeout_secs: default_generation_timeout_secs(),
            prompt_template_path: None,
            no_context_message: default_no_context_message(),
            fallback_message: default_fallback_message(),
        }
    }
}

fn default_generation_provider() -> String {
    "gemini".to_string()
}
fn default_generation_model() -> String {
    "gemini-pro-latest".to_string()
}
fn default_generation_timeout_secs() -> u64 {
    60
}
fn default_no_context_message() -> String {
    DEFAULT_NO_CONTEXT_MESSAGE.to_string()
}
fn default_fallback_message() -> String {
    DEFAULT_FALLBACK_MESSAGE.to_string()
}

impl GenerationConfig {
    /// Load the configured template, or the built-in one.
    pub fn prompt_template(&self) -> Result<PromptTemplate> {
        match &self.prompt_template_path {
            Some(path) => {
                let text = std::fs::read_to_string(path).with_context(|| {
                    format!("Failed to read prompt template: {}", path.display())
                })?;
                PromptTemplate::new(text)
                    .with_context(|| format!("Invalid prompt template: {}", path.display()))
            }
            None => Ok(PromptTemplate::default()),
        }
    }

    pub fn messages(&self) -> ReplyMessages {
        ReplyMessages {
            no_context: self.no_context_message.clone(),
            fallback: self.fallback_message.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Attempts per network-bound step, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay; attempt `n` waits `backoff_ms × n` before retrying.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_ms() -> u64 {
    500
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    /// Ingest uploads in a background task and answer `202` immediately.
    #[serde(default)]
    pub background_ingest: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            upload_dir: default_upload_dir(),
            max_upload_bytes: default_max_upload_bytes(),
            background_ingest: false,
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:5000".to_string()
}
fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}
fn default_max_upload_bytes() -> usize {
    50 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatLogConfig {
    #[serde(default = "default_sink")]
    pub sink: String,
    /// Output file for the `jsonl` sink.
    #[serde(default = "default_log_path")]
    pub path: PathBuf,
    #[serde(default = "default_log_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ChatLogConfig {
    fn default() -> Self {
        Self {
            sink: default_sink(),
            path: default_log_path(),
            timeout_ms: default_log_timeout_ms(),
        }
    }
}

fn default_sink() -> String {
    "sqlite".to_string()
}
fn default_log_path() -> PathBuf {
    PathBuf::from("chat_log.jsonl")
}
fn default_log_timeout_ms() -> u64 {
    2000
}

impl ChatLogConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        bail!("chunking.chunk_overlap must be < chunking.chunk_size");
    }
    config.chunking.heading_patterns()?;

    // Validate retrieval
    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }
    if config.retrieval.collection.trim().is_empty() {
        bail!("retrieval.collection must not be empty");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "disabled" | "local" | "hashed" => {}
        "openai" | "ollama" => {
            if config.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, local, openai, ollama, or hashed.",
            other
        ),
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }
    if config.embedding.max_input_chars == 0 {
        bail!("embedding.max_input_chars must be > 0");
    }

    // Validate generation
    match config.generation.provider.as_str() {
        "disabled" | "gemini" | "ollama" => {}
        other => bail!(
            "Unknown generation provider: '{}'. Must be disabled, gemini, or ollama.",
            other
        ),
    }
    config.generation.prompt_template()?;

    // Validate ingest
    if config.ingest.max_attempts < 1 {
        bail!("ingest.max_attempts must be >= 1");
    }

    // Validate chat log
    match config.chat_log.sink.as_str() {
        "disabled" | "sqlite" | "jsonl" => {}
        other => bail!(
            "Unknown chat_log sink: '{}'. Must be disabled, sqlite, or jsonl.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_text: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_text)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let config = parse("[db]\npath = \"x.sqlite\"\n").unwrap();
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 100);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.retrieval.collection, "socratic_collection");
        assert_eq!(config.embedding.provider, "local");
        assert_eq!(config.generation.provider, "gemini");
        assert_eq!(config.ingest.max_attempts, 3);
        assert_eq!(config.chat_log.sink, "sqlite");
        assert!(!config.server.background_ingest);
    }

    #[test]
    fn custom_profile_is_compiled() {
        let config = parse(
            r#"
[db]
path = "x.sqlite"

[chunking]
profile = "syllabus"

[chunking.profiles.syllabus]
heading_patterns = ['^(?i)unit\s+\d+']
"#,
        )
        .unwrap();
        let patterns = config.chunking.heading_patterns().unwrap();
        assert!(patterns.is_heading("Unit 3: Thermodynamics"));
        assert!(!patterns.is_heading("Amendment of section 2."));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(parse("[db]\npath = \"x\"\n[chunking]\nchunk_size = 0\n").is_err());
        assert!(parse("[db]\npath = \"x\"\n[chunking]\nchunk_size = 100\nchunk_overlap = 100\n").is_err());
        assert!(parse("[db]\npath = \"x\"\n[chunking]\nprofile = \"poetry\"\n").is_err());
        assert!(parse("[db]\npath = \"x\"\n[embedding]\nprovider = \"magic\"\n").is_err());
        assert!(parse("[db]\npath = \"x\"\n[embedding]\nprovider = \"openai\"\n").is_err());
        assert!(parse("[db]\npath = \"x\"\n[generation]\nprovider = \"magic\"\n").is_err());
        assert!(parse("[db]\npath = \"x\"\n[retrieval]\ntop_k = 0\n").is_err());
        assert!(parse("[db]\npath = \"x\"\n[chat_log]\nsink = \"mongo\"\n").is_err());
        assert!(parse("[db]\npath = \"x\"\n[chunking.profiles.legal]\nheading_patterns = [\"(\"]\n").is_err());
    }

    #[test]
    fn template_override_is_validated() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.txt");
        std::fs::write(&good, "Q: {student_question}\nC: {context}").unwrap();
        let bad = dir.path().join("bad.txt");
        std::fs::write(&bad, "no placeholders").unwrap();

        let mut generation = GenerationConfig {
            prompt_template_path: Some(good),
            ..Default::default()
        };
        assert_eq!(
            generation.prompt_template().unwrap().as_str(),
            "Q: {student_question}\nC: {context}"
        );
        generation.prompt_template_path = Some(bad);
        assert!(generation.prompt_template().is_err());
    }
}

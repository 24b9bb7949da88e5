//! Text-generation providers.
//!
//! Concrete implementations of the core [`Generator`] trait:
//! - **[`GeminiGenerator`]**: Google Gemini `generateContent`; requires `GOOGLE_API_KEY`.
//! - **[`OllamaGenerator`]**: a local Ollama instance's `/api/generate`.
//! - **[`DisabledGenerator`]**: always fails, so every chat returns the fallback message.
//!
//! [`run_models`] backs `tutor models`, which lists the Gemini models a key
//! can use for `generateContent`.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use socratic_tutor_core::error::GenerationError;
use socratic_tutor_core::generation::Generator;

use crate::config::GenerationConfig;
use crate::embedding::DEFAULT_OLLAMA_URL;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

fn transport(e: reqwest::Error) -> GenerationError {
    GenerationError::Transport(e.to_string())
}

async fn read_json(response: reqwest::Response) -> Result<serde_json::Value, GenerationError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(GenerationError::Api {
            status: status.as_u16(),
            body,
        });
    }
    response.json().await.map_err(transport)
}

pub struct GeminiGenerator {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var("GOOGLE_API_KEY")
            .map_err(|_| anyhow::anyhow!("GOOGLE_API_KEY environment variable not set"))?;
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()?,
            api_key,
            model: config.model.clone(),
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
        })
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
        });

        debug!(model = %self.model, prompt_chars = prompt.len(), "gemini request");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;

        let json = read_json(response).await?;
        parse_gemini_response(&json)
    }
}

impl GeminiGenerator {
    /// Names of the models this key may call `generateContent` on, following
    /// `nextPageToken` until the listing is exhausted.
    pub async fn list_models(&self) -> Result<Vec<String>, GenerationError> {
        let url = format!("{}/models", self.base_url.trim_end_matches('/'));
        let mut names = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self
                .client
                .get(&url)
                .header("x-goog-api-key", &self.api_key)
                .query(&[("pageSize", "1000")]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }
            let json = read_json(request.send().await.map_err(transport)?).await?;
            names.extend(generate_content_models(&json));
            page_token = json["nextPageToken"]
                .as_str()
                .filter(|t| !t.is_empty())
                .map(str::to_string);
            if page_token.is_none() {
                break;
            }
        }
        Ok(names)
    }
}

fn generate_content_models(json: &serde_json::Value) -> Vec<String> {
    json["models"]
        .as_array()
        .map(|models| {
            models
                .iter()
                .filter(|m| {
                    m["supportedGenerationMethods"]
                        .as_array()
                        .is_some_and(|methods| methods.iter().any(|x| x == "generateContent"))
                })
                .filter_map(|m| m["name"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// `tutor models`: print the Gemini models usable for chat replies.
pub async fn run_models() -> Result<()> {
    let gemini = GeminiGenerator::new(&GenerationConfig::default())?;
    let models = gemini.list_models().await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to list models: {}. Check that GOOGLE_API_KEY is valid and the \
             Generative Language API is enabled for its project.",
            e
        )
    })?;
    if models.is_empty() {
        println!("No models support generateContent for this key.");
        return Ok(());
    }
    for name in models {
        println!("- {}", name);
    }
    Ok(())
}

fn parse_gemini_response(json: &serde_json::Value) -> Result<String, GenerationError> {
    json["candidates"][0]["content"]["parts"][0]["text"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| {
            GenerationError::Malformed("missing candidates[0].content.parts[0].text".into())
        })
}

pub struct OllamaGenerator {
    client: reqwest::Client,
    url: String,
    model: String,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()?,
            url: url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let body = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });

        debug!(model = %self.model, prompt_chars = prompt.len(), "ollama request");

        let response = self
            .client
            .post(format!("{}/api/generate", self.url))
            .json(&body)
            .send()
            .await
            .map_err(transport)?;

        let json = read_json(response).await?;
        json["response"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| GenerationError::Malformed("missing response field".into()))
    }
}

pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
        Err(GenerationError::Disabled)
    }
}

/// Create the [`Generator`] named by `config.provider`.
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiGenerator::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaGenerator::new(config)?)),
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        other => bail!("Unknown generation provider: {}", other),
    }
}

//! Text generation capability and its backends.
//!
//! The prompt composers produce a single prompt string; a [`Generator`]
//! turns it into text. Backends are chosen once by [`create_generator`]:
//!
//! | Provider | Type | Endpoint |
//! |----------|------|----------|
//! | `ollama` | [`OllamaGenerator`] | `POST {url}/api/generate` |
//! | `openai` | [`ChatCompletionsGenerator`] | `https://api.openai.com/v1/chat/completions` |
//! | `mistral` | [`ChatCompletionsGenerator`] | `https://api.mistral.ai/v1/chat/completions` |
//! | `groq` | [`ChatCompletionsGenerator`] | `https://api.groq.com/openai/v1/chat/completions` |
//!
//! Generation is a single blocking request with the configured timeout.
//! There is no retry loop here.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::{GenerationConfig, GenerationProviderKind};

#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;

    fn model_name(&self) -> &str;
}

pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    let generator: Arc<dyn Generator> = match config.provider {
        GenerationProviderKind::Ollama => Arc::new(OllamaGenerator::new(config)?),
        GenerationProviderKind::OpenAi => Arc::new(ChatCompletionsGenerator::build(
            config,
            "OpenAI",
            "https://api.openai.com/v1",
            "OPENAI_API_KEY",
        )?),
        GenerationProviderKind::Mistral => Arc::new(ChatCompletionsGenerator::build(
            config,
            "Mistral",
            "https://api.mistral.ai/v1",
            "MISTRAL_API_KEY",
        )?),
        GenerationProviderKind::Groq => Arc::new(ChatCompletionsGenerator::build(
            config,
            "Groq",
            "https://api.groq.com/openai/v1",
            "GROQ_API_KEY",
        )?),
    };
    Ok(generator)
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

async fn post_json(
    request: reqwest::RequestBuilder,
    body: &serde_json::Value,
    provider: &str,
) -> Result<serde_json::Value> {
    let response = request
        .header("Content-Type", "application/json")
        .json(body)
        .send()
        .await
        .with_context(|| format!("{} request failed", provider))?;

    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        bail!("{} API error {}: {}", provider, status, body_text);
    }
    Ok(response.json().await?)
}

// ============ Ollama ============

pub struct OllamaGenerator {
    client: reqwest::Client,
    url: String,
    model: String,
    temperature: f32,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": { "temperature": self.temperature },
        });
        let endpoint = format!("{}/api/generate", self.url.trim_end_matches('/'));
        debug!(model = %self.model, prompt_chars = prompt.len(), "ollama generate");
        let json = post_json(self.client.post(&endpoint), &body, "Ollama").await?;
        parse_ollama_generate(&json)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn parse_ollama_generate(json: &serde_json::Value) -> Result<String> {
    json.get("response")
        .and_then(|r| r.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing response field"))
}

// ============ OpenAI-compatible chat completions ============

/// Chat-completions client shared by OpenAI, Mistral, and Groq.
pub struct ChatCompletionsGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    provider: &'static str,
}

impl ChatCompletionsGenerator {
    pub fn build(
        config: &GenerationConfig,
        provider: &'static str,
        default_base: &str,
        key_var: &str,
    ) -> Result<Self> {
        let api_key = std::env::var(key_var)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", key_var))?;
        let base = config.url.as_deref().unwrap_or(default_base);
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            endpoint: format!("{}/chat/completions", base.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            provider,
        })
    }
}

#[async_trait]
impl Generator for ChatCompletionsGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": self.temperature,
        });
        debug!(provider = self.provider, model = %self.model, "chat completion");
        let request = self.client.post(&self.endpoint).bearer_auth(&self.api_key);
        let json = post_json(request, &body, self.provider).await?;
        parse_chat_completion(&json)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn parse_chat_completion(json: &serde_json::Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Invalid chat completion: missing choices[0].message.content"))
}

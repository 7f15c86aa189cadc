//! Chat model providers for the rerank and answer stages.
//!
//! `openai` speaks the OpenAI-compatible `/chat/completions` protocol
//! against any base URL (OpenAI, Groq, llama.cpp server, vLLM).
//! `ollama` speaks Ollama's native `/api/chat` with streaming off.
//! Both send a single user message and return the trimmed content of the
//! first choice; an empty completion is an error.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::ModelConfig;
use crate::http;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;
    /// Send `prompt` as a single user turn and return the reply text.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: AssistantMessage,
}

fn non_empty(content: Option<String>, model: &str) -> Result<String> {
    let text = content.unwrap_or_default().trim().to_string();
    if text.is_empty() {
        bail!("{} returned an empty completion", model);
    }
    Ok(text)
}

// ============ OpenAI-compatible ============

pub struct OpenAiCompatibleChat {
    model: String,
    endpoint: String,
    api_key: Option<String>,
    temperature: f32,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAiCompatibleChat {
    /// The API key is read from `config.api_key_env`. It is required for
    /// the default OpenAI endpoint and optional for a custom `url`.
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        if api_key.is_none() && config.url.is_none() {
            bail!("{} environment variable not set", config.api_key_env);
        }

        let base = config.url.as_deref().unwrap_or(OPENAI_BASE_URL);
        Ok(Self {
            model: config.model.clone(),
            endpoint: format!("{}/chat/completions", base.trim_end_matches('/')),
            api_key,
            temperature: config.temperature,
            max_retries: config.max_retries,
            client: http::build_client(config.timeout().as_secs())
                .context("failed to build chat HTTP client")?,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatibleChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            stream: None,
        };
        let json = http::post_json(
            &self.client,
            &self.endpoint,
            self.api_key.as_deref().map(str::trim),
            &body,
            self.max_retries,
            "chat completions",
        )
        .await?;

        let parsed: ChatResponse =
            serde_json::from_value(json).context("failed to parse chat completions response")?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content);
        non_empty(content, &self.model)
    }
}

// ============ Ollama ============

pub struct OllamaChat {
    model: String,
    endpoint: String,
    temperature: f32,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaChat {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let base = config.url.as_deref().unwrap_or(OLLAMA_BASE_URL);
        Ok(Self {
            model: config.model.clone(),
            endpoint: format!("{}/api/chat", base.trim_end_matches('/')),
            temperature: config.temperature,
            max_retries: config.max_retries,
            client: http::build_client(config.timeout().as_secs())
                .context("failed to build Ollama HTTP client")?,
        })
    }
}

#[async_trait]
impl ChatModel for OllamaChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "stream": false,
            "options": {"temperature": self.temperature},
        });
        let json = http::post_json(
            &self.client,
            &self.endpoint,
            None,
            &body,
            self.max_retries,
            "Ollama",
        )
        .await?;

        let parsed: OllamaChatResponse =
            serde_json::from_value(json).context("failed to parse Ollama chat response")?;
        non_empty(parsed.message.content, &self.model)
    }
}

/// Create the configured [`ChatModel`].
pub fn create_chat_model(config: &ModelConfig) -> Result<Arc<dyn ChatModel>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiCompatibleChat::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaChat::new(config)?)),
        other => bail!("Unknown chat provider: {}", other),
    }
}

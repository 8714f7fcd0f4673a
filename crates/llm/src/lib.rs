//! The outbound generator interface and its HTTP implementation.
//!
//! The orchestrator only sees the [`Generator`] trait: one-shot and streaming
//! completion behind a single adapter, so a scripted stand-in slots in for
//! tests exactly where the production client does. [`HttpGenerator`] speaks
//! the OpenAI-compatible `/chat/completions` dialect.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use terrace_config::GeneratorConfig;

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("generator request failed: {0}")]
    Request(String),
    #[error("generator returned an error payload ({status}): {detail}")]
    Api { status: u16, detail: String },
    #[error("generator response missing completion text")]
    EmptyCompletion,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// One prior exchange forwarded for multi-turn continuity.
#[derive(Debug, Clone)]
pub struct HistoryTurn {
    pub user: String,
    pub assistant: String,
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub user_message: String,
    pub history: Vec<HistoryTurn>,
}

#[derive(Debug, Clone)]
pub struct Generation {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

/// The outbound text generator.
///
/// `generate_stream` sends chunks through `tx` as they arrive and still
/// returns the assembled [`Generation`]; dropping the receiver is harmless.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, GeneratorError>;

    async fn generate_stream(
        &self,
        request: &GenerationRequest,
        tx: mpsc::Sender<String>,
    ) -> Result<Generation, GeneratorError>;
}

// ── HTTP client ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct HttpGenerator {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl HttpGenerator {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    /// Build from configuration; the bearer token is read from the
    /// environment variable the config names and never stored in config.
    pub fn from_config(config: &GeneratorConfig) -> Result<Self, GeneratorError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| GeneratorError::Request(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key: std::env::var(&config.api_key_env)
                .ok()
                .filter(|k| !k.trim().is_empty()),
        })
    }

    fn request_builder(&self, payload: &serde_json::Value) -> reqwest::RequestBuilder {
        let mut builder = self.client.post(&self.endpoint).json(payload);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        builder
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, GeneratorError> {
        let payload = json!({
            "model": self.model,
            "messages": build_messages(request),
        });

        let response = self
            .request_builder(&payload)
            .send()
            .await
            .map_err(|err| GeneratorError::Request(err.to_string()))?;

        let status = response.status();
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|err| GeneratorError::Request(err.to_string()))?;
        if !status.is_success() {
            return Err(GeneratorError::Api {
                status: status.as_u16(),
                detail: body.to_string(),
            });
        }

        let text = body
            .get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .ok_or(GeneratorError::EmptyCompletion)?
            .to_string();

        debug!(reply_len = text.len(), "generator reply received");
        Ok(Generation {
            text,
            usage: parse_usage(&body),
        })
    }

    async fn generate_stream(
        &self,
        request: &GenerationRequest,
        tx: mpsc::Sender<String>,
    ) -> Result<Generation, GeneratorError> {
        let payload = json!({
            "model": self.model,
            "messages": build_messages(request),
            "stream": true,
        });

        let mut response = self
            .request_builder(&payload)
            .send()
            .await
            .map_err(|err| GeneratorError::Request(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body: serde_json::Value = response
                .json()
                .await
                .map_err(|err| GeneratorError::Request(err.to_string()))?;
            return Err(GeneratorError::Api {
                status: status.as_u16(),
                detail: body.to_string(),
            });
        }

        let mut full_text = String::new();
        let mut usage = None;
        let mut carry = String::new();

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|err| GeneratorError::Request(err.to_string()))?
        {
            // SSE events may split across network chunks; carry partial lines.
            carry.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(newline) = carry.find('\n') {
                let line = carry[..newline].trim().to_string();
                carry.drain(..=newline);
                match parse_stream_line(&line) {
                    StreamLine::Delta(text) => {
                        full_text.push_str(&text);
                        if tx.send(text).await.is_err() {
                            warn!("stream receiver dropped; continuing to accumulate");
                        }
                    }
                    StreamLine::Usage(parsed) => usage = Some(parsed),
                    StreamLine::Ignore => {}
                }
            }
        }

        if full_text.is_empty() {
            return Err(GeneratorError::EmptyCompletion);
        }
        Ok(Generation {
            text: full_text,
            usage,
        })
    }
}

fn build_messages(request: &GenerationRequest) -> Vec<serde_json::Value> {
    let mut messages = Vec::with_capacity(request.history.len() * 2 + 2);
    messages.push(json!({"role": "system", "content": request.system_prompt}));
    for turn in &request.history {
        messages.push(json!({"role": "user", "content": turn.user}));
        messages.push(json!({"role": "assistant", "content": turn.assistant}));
    }
    messages.push(json!({"role": "user", "content": request.user_message}));
    messages
}

enum StreamLine {
    Delta(String),
    Usage(TokenUsage),
    Ignore,
}

/// Parse one SSE line of an OpenAI-compatible stream.
fn parse_stream_line(line: &str) -> StreamLine {
    if line.is_empty() || line == "data: [DONE]" {
        return StreamLine::Ignore;
    }
    let Some(data) = line.strip_prefix("data: ") else {
        return StreamLine::Ignore;
    };
    let Ok(json) = serde_json::from_str::<serde_json::Value>(data) else {
        return StreamLine::Ignore;
    };

    if let Some(usage) = parse_usage(&json) {
        return StreamLine::Usage(usage);
    }

    let delta = json
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("delta"))
        .and_then(|delta| delta.get("content"))
        .and_then(|content| content.as_str())
        .unwrap_or("");
    if delta.is_empty() {
        StreamLine::Ignore
    } else {
        StreamLine::Delta(delta.to_string())
    }
}

fn parse_usage(body: &serde_json::Value) -> Option<TokenUsage> {
    let usage = body.get("usage")?;
    Some(TokenUsage {
        input_tokens: usage.get("prompt_tokens")?.as_u64()?,
        output_tokens: usage.get("completion_tokens")?.as_u64()?,
    })
}

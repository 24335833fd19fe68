use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ChatConfig;
use crate::util::endpoint_url;

use super::{ChatMessage, ChatModel};

/// Client for any OpenAI-compatible `/chat/completions` endpoint (Groq,
/// OpenAI, local inference servers).
pub struct OpenAiChatClient {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiChatClient {
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("failed to build chat http client")?;

        Ok(Self {
            client,
            url: endpoint_url(&config.endpoint, "chat/completions"),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiChatClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let body = CompletionRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
        };

        let mut request = self.client.post(&self.url).json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("chat completion request failed: {}", self.url))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .context("failed to read chat completion response")?;

        if !status.is_success() {
            bail!("chat completion returned {status}: {text}");
        }

        debug!(model = %self.model, bytes = text.len(), "chat completion received");
        parse_completion(&text)
    }
}

fn parse_completion(raw: &str) -> Result<String> {
    let parsed: CompletionResponse =
        serde_json::from_str(raw).context("failed to parse chat completion response")?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| anyhow!("chat completion response contained no message content"))
}

use std::time::Duration;

use anyhow::{Context, Result, bail, ensure};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::EmbeddingConfig;
use crate::semantic::{LOCAL_HASH_MODEL_NAME, embed_text_local};
use crate::util::endpoint_url;

use super::Embedder;

pub struct OpenAiEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
    dimensions: Option<usize>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("failed to build embedding http client")?;

        Ok(Self {
            client,
            url: endpoint_url(&config.endpoint, "embeddings"),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            dimensions: config.dimensions,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = EmbeddingRequest {
            model: &self.model,
            input: texts,
            dimensions: self.dimensions,
        };

        let mut request = self.client.post(&self.url).json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("embedding request failed: {}", self.url))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .context("failed to read embedding response")?;

        if !status.is_success() {
            bail!("embedding service returned {status}: {text}");
        }

        parse_embeddings(&text, texts.len())
    }
}

fn parse_embeddings(raw: &str, expected: usize) -> Result<Vec<Vec<f32>>> {
    let mut parsed: EmbeddingResponse =
        serde_json::from_str(raw).context("failed to parse embedding response")?;
    ensure!(
        parsed.data.len() == expected,
        "embedding service returned {} vectors for {} inputs",
        parsed.data.len(),
        expected
    );

    parsed.data.sort_by_key(|item| item.index);
    Ok(parsed.data.into_iter().map(|item| item.embedding).collect())
}

/// Offline embedder backed by feature hashing; needs no service and is
/// stable across runs.
pub struct LocalHashEmbedder {
    dimensions: usize,
}

impl LocalHashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

#[async_trait]
impl Embedder for LocalHashEmbedder {
    fn model_name(&self) -> &str {
        LOCAL_HASH_MODEL_NAME
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| embed_text_local(text, self.dimensions))
            .collect())
    }
}

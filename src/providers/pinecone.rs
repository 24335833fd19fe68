use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::config::IndexConfig;
use crate::model::{Document, IndexStats, IndexedPassage, RankedList, ScoredDocument};
use crate::util::endpoint_url;

const API_VERSION: &str = "2024-07";
const TEXT_METADATA_KEY: &str = "text";
const UPSERT_BATCH_LIMIT: usize = 100;

/// Pinecone serverless index. Passage text lives in the `text` metadata
/// field, the layout LangChain's Pinecone store writes.
pub struct PineconeIndex {
    client: reqwest::Client,
    api_key: String,
    name: String,
    control_endpoint: String,
    namespace: Option<String>,
    host: OnceCell<String>,
}

#[derive(Debug, Deserialize)]
struct IndexDescription {
    host: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: f64,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Serialize)]
struct UpsertVector<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<UpsertVector<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteRequest<'a> {
    delete_all: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    #[serde(default)]
    total_vector_count: u64,
    #[serde(default)]
    namespaces: Map<String, Value>,
}

impl PineconeIndex {
    pub fn new(config: &IndexConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| anyhow!("pinecone api key is not configured"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("failed to build pinecone http client")?;

        let host = config
            .host
            .as_deref()
            .filter(|value| !value.is_empty())
            .map(normalize_host);

        Ok(Self {
            client,
            api_key,
            name: config.name.clone(),
            control_endpoint: config.control_endpoint.clone(),
            namespace: config.namespace.clone().filter(|value| !value.is_empty()),
            host: OnceCell::new_with(host),
        })
    }

    async fn data_plane_url(&self, path: &str) -> Result<String> {
        let host = self
            .host
            .get_or_try_init(|| self.describe_host())
            .await?;
        Ok(endpoint_url(host, path))
    }

    async fn describe_host(&self) -> Result<String> {
        let url = endpoint_url(&self.control_endpoint, &format!("indexes/{}", self.name));
        let response = self
            .client
            .get(&url)
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .send()
            .await
            .with_context(|| format!("failed to describe pinecone index '{}'", self.name))?;

        let description: IndexDescription = read_json(response, "describe index").await?;
        info!(index = %self.name, host = %description.host, "resolved pinecone index host");
        Ok(normalize_host(&description.host))
    }

    async fn post<B, T>(&self, path: &str, body: &B, operation: &str) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.data_plane_url(path).await?;
        let response = self
            .client
            .post(&url)
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .json(body)
            .send()
            .await
            .with_context(|| format!("pinecone {operation} request failed: {url}"))?;
        read_json(response, operation).await
    }
}

#[async_trait]
impl super::VectorIndex for PineconeIndex {
    fn backend(&self) -> &'static str {
        "pinecone"
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<RankedList> {
        let body = QueryRequest {
            vector,
            top_k: k,
            include_metadata: true,
            include_values: false,
            namespace: self.namespace.as_deref(),
        };
        let response: QueryResponse = self.post("query", &body, "query").await?;
        debug!(index = %self.name, matches = response.matches.len(), "pinecone query completed");

        Ok(response
            .matches
            .into_iter()
            .take(k)
            .map(match_to_scored_document)
            .collect())
    }

    async fn upsert(&self, passages: &[IndexedPassage]) -> Result<usize> {
        let mut upserted = 0usize;
        for batch in passages.chunks(UPSERT_BATCH_LIMIT) {
            let vectors = batch
                .iter()
                .map(|passage| UpsertVector {
                    id: &passage.id,
                    values: &passage.embedding,
                    metadata: passage_metadata(passage),
                })
                .collect::<Vec<_>>();
            let body = UpsertRequest {
                vectors,
                namespace: self.namespace.as_deref(),
            };
            let response: UpsertResponse =
                self.post("vectors/upsert", &body, "upsert").await?;
            upserted += response.upserted_count;
        }
        Ok(upserted)
    }

    async fn clear(&self) -> Result<()> {
        let body = DeleteRequest {
            delete_all: true,
            namespace: self.namespace.as_deref(),
        };
        let _: Value = self.post("vectors/delete", &body, "delete").await?;
        Ok(())
    }

    async fn stats(&self) -> Result<IndexStats> {
        let response: StatsResponse = self
            .post("describe_index_stats", &serde_json::json!({}), "describe stats")
            .await?;

        let vector_count = match &self.namespace {
            Some(namespace) => response
                .namespaces
                .get(namespace)
                .and_then(|value| value.get("vectorCount"))
                .and_then(Value::as_u64)
                .unwrap_or(0),
            None => response.total_vector_count,
        };

        Ok(IndexStats {
            backend: "pinecone".to_string(),
            index_name: self.name.clone(),
            vector_count,
        })
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response, operation: &str) -> Result<T> {
    let status = response.status();
    let text = response
        .text()
        .await
        .with_context(|| format!("failed to read pinecone {operation} response"))?;

    if !status.is_success() {
        bail!("pinecone {operation} returned {status}: {text}");
    }

    // Delete replies with an empty body.
    let payload = if text.trim().is_empty() { "{}" } else { text.as_str() };
    serde_json::from_str(payload)
        .with_context(|| format!("failed to parse pinecone {operation} response"))
}

fn normalize_host(host: &str) -> String {
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

fn match_to_scored_document(matched: QueryMatch) -> ScoredDocument {
    let mut metadata = matched.metadata.unwrap_or_default();
    let content = match metadata.remove(TEXT_METADATA_KEY) {
        Some(Value::String(text)) => text,
        Some(other) => other.to_string(),
        None => String::new(),
    };

    ScoredDocument::new(
        Document {
            id: Some(matched.id),
            content,
            metadata,
        },
        matched.score,
    )
}

fn passage_metadata(passage: &IndexedPassage) -> Map<String, Value> {
    let mut metadata = passage.metadata.clone();
    metadata.insert(
        TEXT_METADATA_KEY.to_string(),
        Value::String(passage.content.clone()),
    );
    metadata.insert(
        "text_hash".to_string(),
        Value::String(passage.text_hash.clone()),
    );
    metadata
}

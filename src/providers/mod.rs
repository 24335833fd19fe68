mod chat;
mod embedding;
mod pinecone;
mod retriever;
mod sqlite_index;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{ChatConfig, EmbeddingConfig, EmbeddingProvider, IndexBackend, IndexConfig};
use crate::model::{IndexStats, IndexedPassage, RankedList};

pub use chat::OpenAiChatClient;
pub use embedding::{LocalHashEmbedder, OpenAiEmbedder};
pub use pinecone::PineconeIndex;
pub use retriever::EmbeddingRetriever;
pub use sqlite_index::SqliteIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
}

/// Chat-completion service shared by query expansion and answer synthesis.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_name(&self) -> &str;

    /// One vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    fn backend(&self) -> &'static str;

    fn name(&self) -> &str;

    /// At most `k` passages, most similar first.
    async fn query(&self, vector: &[f32], k: usize) -> Result<RankedList>;

    async fn upsert(&self, passages: &[IndexedPassage]) -> Result<usize>;

    async fn clear(&self) -> Result<()>;

    async fn stats(&self) -> Result<IndexStats>;
}

/// Similarity search for one query string. Implementations return passages
/// in descending similarity and may return fewer than `k`.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn search(&self, query: &str, k: usize) -> Result<RankedList>;
}

pub fn build_chat_model(config: &ChatConfig) -> Result<Arc<dyn ChatModel>> {
    Ok(Arc::new(OpenAiChatClient::new(config)?))
}

pub fn build_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    let embedder: Arc<dyn Embedder> = match config.provider {
        EmbeddingProvider::OpenAi => Arc::new(OpenAiEmbedder::new(config)?),
        EmbeddingProvider::LocalHash => Arc::new(LocalHashEmbedder::new(config.local_dimensions())),
    };
    Ok(embedder)
}

pub fn build_vector_index(
    config: &IndexConfig,
    embedding_model: &str,
) -> Result<Arc<dyn VectorIndex>> {
    let index: Arc<dyn VectorIndex> = match config.backend {
        IndexBackend::Pinecone => Arc::new(PineconeIndex::new(config)?),
        IndexBackend::Sqlite => Arc::new(SqliteIndex::new(
            &config.name,
            config.db_path.clone(),
            embedding_model,
        )),
    };
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_message_serializes_openai_roles() {
        let value = serde_json::to_value(ChatMessage::system("be brief"))
            .expect("message should serialize");
        assert_eq!(value, serde_json::json!({"role": "system", "content": "be brief"}));
    }
}

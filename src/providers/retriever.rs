use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tracing::debug;

use crate::model::RankedList;

use super::{Embedder, Retriever, VectorIndex};

/// Embeds the query, then asks the vector index for its nearest passages.
pub struct EmbeddingRetriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
}

impl EmbeddingRetriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, index }
    }
}

#[async_trait]
impl Retriever for EmbeddingRetriever {
    async fn search(&self, query: &str, k: usize) -> Result<RankedList> {
        // Embedding services reject empty input and a blank query carries no
        // similarity signal, so it retrieves nothing.
        if query.trim().is_empty() {
            debug!("blank query retrieves no passages");
            return Ok(Vec::new());
        }

        let mut vectors = self.embedder.embed(&[query.to_string()]).await?;
        let vector = vectors
            .pop()
            .ok_or_else(|| anyhow!("embedder returned no vector for the query"))?;

        let mut results = self.index.query(&vector, k).await?;
        results.truncate(k);
        debug!(
            index = %self.index.name(),
            backend = self.index.backend(),
            k,
            returned = results.len(),
            "similarity search completed"
        );
        Ok(results)
    }
}

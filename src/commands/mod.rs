pub mod ask;
pub mod clear;
pub mod serve;
pub mod status;
pub mod upload;

use std::sync::Arc;

use anyhow::Result;

use crate::config::AppConfig;
use crate::indexing::PassageIndexer;
use crate::providers::{
    EmbeddingRetriever, build_chat_model, build_embedder, build_vector_index,
};
use crate::rag::AskPipeline;

fn build_indexer(config: &AppConfig) -> Result<PassageIndexer> {
    let embedder = build_embedder(&config.embedding)?;
    let index = build_vector_index(&config.index, embedder.model_name())?;
    Ok(PassageIndexer::new(
        embedder,
        index,
        config.embedding.batch_size,
    ))
}

fn build_pipeline(config: &AppConfig) -> Result<AskPipeline> {
    config.require_chat_key()?;
    let chat = build_chat_model(&config.chat)?;
    let embedder = build_embedder(&config.embedding)?;
    let index = build_vector_index(&config.index, embedder.model_name())?;
    let retriever = Arc::new(EmbeddingRetriever::new(embedder, index));
    Ok(AskPipeline::new(chat, retriever, config))
}

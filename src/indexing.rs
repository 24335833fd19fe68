use std::sync::Arc;

use anyhow::{Result, ensure};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::model::{IndexStats, IndexedPassage, PassageRecord};
use crate::providers::{Embedder, VectorIndex};
use crate::semantic::embedding_text_hash;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UploadSummary {
    pub received: usize,
    pub uploaded: usize,
    pub skipped_empty: usize,
}

/// Embeds caller-supplied passages and writes them to the vector index.
/// Passages are stored as given; nothing is chunked or rewritten.
pub struct PassageIndexer {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    batch_size: usize,
}

impl PassageIndexer {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>, batch_size: usize) -> Self {
        Self {
            embedder,
            index,
            batch_size: batch_size.max(1),
        }
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    pub async fn upload(&self, records: Vec<PassageRecord>) -> Result<UploadSummary> {
        let mut summary = UploadSummary {
            received: records.len(),
            ..UploadSummary::default()
        };

        let mut pending = Vec::<PassageRecord>::with_capacity(records.len());
        for (position, record) in records.into_iter().enumerate() {
            if record.content.trim().is_empty() {
                warn!(
                    position,
                    id = record.id.as_deref().unwrap_or(""),
                    "skipping passage with empty content"
                );
                summary.skipped_empty += 1;
                continue;
            }
            pending.push(record);
        }

        for batch in pending.chunks(self.batch_size) {
            let texts = batch
                .iter()
                .map(|record| record.content.clone())
                .collect::<Vec<_>>();
            let vectors = self.embedder.embed(&texts).await?;
            ensure!(
                vectors.len() == batch.len(),
                "embedder returned {} vectors for {} passages",
                vectors.len(),
                batch.len()
            );

            let passages = batch
                .iter()
                .zip(vectors)
                .map(|(record, embedding)| IndexedPassage {
                    id: passage_id(record),
                    content: record.content.clone(),
                    metadata: record.metadata.clone(),
                    text_hash: embedding_text_hash(&record.content),
                    embedding,
                })
                .collect::<Vec<_>>();

            summary.uploaded += self.index.upsert(&passages).await?;
            info!(
                index = self.index.name(),
                batch = passages.len(),
                uploaded = summary.uploaded,
                "upload batch committed"
            );
        }

        info!(
            index = self.index.name(),
            backend = self.index.backend(),
            model = self.embedder.model_name(),
            received = summary.received,
            uploaded = summary.uploaded,
            skipped_empty = summary.skipped_empty,
            "upload complete"
        );
        Ok(summary)
    }

    pub async fn clear(&self) -> Result<()> {
        self.index.clear().await?;
        info!(index = self.index.name(), backend = self.index.backend(), "index cleared");
        Ok(())
    }

    pub async fn stats(&self) -> Result<IndexStats> {
        self.index.stats().await
    }
}

fn passage_id(record: &PassageRecord) -> String {
    match record.id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => Uuid::new_v4().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Map, Value, json};

    use super::*;
    use crate::providers::{LocalHashEmbedder, SqliteIndex};
    use crate::semantic::LOCAL_HASH_MODEL_NAME;

    fn record(id: Option<&str>, content: &str) -> PassageRecord {
        PassageRecord {
            id: id.map(str::to_string),
            content: content.to_string(),
            metadata: Map::new(),
        }
    }

    fn indexer(dir: &tempfile::TempDir, batch_size: usize) -> PassageIndexer {
        let index = SqliteIndex::new(
            "test-passages",
            dir.path().join("index.sqlite"),
            LOCAL_HASH_MODEL_NAME,
        );
        PassageIndexer::new(
            Arc::new(LocalHashEmbedder::new(64)),
            Arc::new(index),
            batch_size,
        )
    }

    #[tokio::test]
    async fn upload_embeds_in_batches_and_counts_passages() {
        let dir = tempfile::tempdir().expect("tempdir");
        let indexer = indexer(&dir, 2);

        let summary = indexer
            .upload(vec![
                record(Some("cal-1"), "O semestre começa em março."),
                record(Some("cal-2"), "As provas finais ocorrem em julho."),
                record(None, "A rematrícula é feita pelo portal."),
            ])
            .await
            .expect("upload");

        assert_eq!(
            summary,
            UploadSummary {
                received: 3,
                uploaded: 3,
                skipped_empty: 0,
            }
        );
        assert_eq!(indexer.stats().await.expect("stats").vector_count, 3);
    }

    #[tokio::test]
    async fn empty_content_is_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let indexer = indexer(&dir, 8);

        let summary = indexer
            .upload(vec![record(Some("blank"), "   "), record(Some("ok"), "texto")])
            .await
            .expect("upload");

        assert_eq!(summary.uploaded, 1);
        assert_eq!(summary.skipped_empty, 1);
    }

    #[tokio::test]
    async fn reupload_with_same_id_replaces_passage() {
        let dir = tempfile::tempdir().expect("tempdir");
        let indexer = indexer(&dir, 8);

        indexer
            .upload(vec![record(Some("p1"), "versão antiga")])
            .await
            .expect("first upload");
        indexer
            .upload(vec![record(Some("p1"), "versão nova")])
            .await
            .expect("second upload");

        assert_eq!(indexer.stats().await.expect("stats").vector_count, 1);
        let vector = LocalHashEmbedder::new(64)
            .embed(&["versão nova".to_string()])
            .await
            .expect("embed");
        let hits = indexer.index().query(&vector[0], 1).await.expect("query");
        assert_eq!(hits[0].document.content, "versão nova");
    }

    #[tokio::test]
    async fn clear_empties_the_index() {
        let dir = tempfile::tempdir().expect("tempdir");
        let indexer = indexer(&dir, 8);
        indexer
            .upload(vec![record(None, "a"), record(None, "b")])
            .await
            .expect("upload");

        indexer.clear().await.expect("clear");

        assert_eq!(indexer.stats().await.expect("stats").vector_count, 0);
    }

    #[test]
    fn missing_or_blank_ids_get_generated_uuid() {
        let generated = passage_id(&record(None, "x"));
        assert!(Uuid::parse_str(&generated).is_ok());
        assert!(Uuid::parse_str(&passage_id(&record(Some(" "), "x"))).is_ok());
        assert_eq!(passage_id(&record(Some("keep-me"), "x")), "keep-me");
    }

    #[tokio::test]
    async fn metadata_is_stored_with_the_passage() {
        let dir = tempfile::tempdir().expect("tempdir");
        let indexer = indexer(&dir, 8);
        let mut metadata = Map::new();
        metadata.insert("source".to_string(), json!("calendario.pdf"));

        indexer
            .upload(vec![PassageRecord {
                id: Some("m1".to_string()),
                content: "conteúdo".to_string(),
                metadata,
            }])
            .await
            .expect("upload");

        let vector = LocalHashEmbedder::new(64)
            .embed(&["conteúdo".to_string()])
            .await
            .expect("embed");
        let hits = indexer.index().query(&vector[0], 5).await.expect("query");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document.id.as_deref(), Some("m1"));
        assert_eq!(hits[0].document.metadata["source"], Value::from("calendario.pdf"));
    }
}

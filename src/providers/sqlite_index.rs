use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{Connection, OpenFlags, params};
use serde_json::{Map, Value};
use tracing::debug;

use crate::model::{Document, IndexStats, IndexedPassage, RankedList, ScoredDocument};
use crate::semantic::{cosine_similarity, decode_embedding_blob, encode_embedding_blob};
use crate::util::{ensure_parent_directory, now_utc_string};

/// Local vector index: passages and their embeddings in one SQLite file,
/// searched by brute-force cosine similarity. Several named indexes can share
/// a file.
pub struct SqliteIndex {
    name: String,
    db_path: PathBuf,
    model_id: String,
}

impl SqliteIndex {
    pub fn new(name: &str, db_path: PathBuf, model_id: &str) -> Self {
        Self {
            name: name.to_string(),
            db_path,
            model_id: model_id.to_string(),
        }
    }

    async fn with_connection<T, F>(&self, operation: &'static str, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = open_index_connection(&db_path)?;
            ensure_index_schema(&connection)?;
            work(&mut connection)
        })
        .await
        .with_context(|| format!("sqlite {operation} task did not complete"))?
        .with_context(|| format!("sqlite {operation} failed"))
    }
}

#[async_trait]
impl super::VectorIndex for SqliteIndex {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<RankedList> {
        let name = self.name.clone();
        let model_id = self.model_id.clone();
        let vector = vector.to_vec();
        self.with_connection("query", move |connection| {
            search_passages(connection, &name, &model_id, &vector, k)
        })
        .await
    }

    async fn upsert(&self, passages: &[IndexedPassage]) -> Result<usize> {
        let name = self.name.clone();
        let model_id = self.model_id.clone();
        let passages = passages.to_vec();
        self.with_connection("upsert", move |connection| {
            upsert_passages(connection, &name, &model_id, &passages)
        })
        .await
    }

    async fn clear(&self) -> Result<()> {
        let name = self.name.clone();
        self.with_connection("clear", move |connection| {
            let removed = connection.execute(
                "DELETE FROM passages WHERE index_name = ?1",
                params![name],
            )?;
            debug!(index = %name, removed, "sqlite index cleared");
            Ok(())
        })
        .await
    }

    async fn stats(&self) -> Result<IndexStats> {
        let name = self.name.clone();
        let vector_count = self
            .with_connection("stats", move |connection| {
                let count: i64 = connection.query_row(
                    "SELECT COUNT(*) FROM passages WHERE index_name = ?1",
                    params![name],
                    |row| row.get(0),
                )?;
                Ok(count.max(0) as u64)
            })
            .await?;

        Ok(IndexStats {
            backend: "sqlite".to_string(),
            index_name: self.name.clone(),
            vector_count,
        })
    }
}

fn open_index_connection(db_path: &Path) -> Result<Connection> {
    ensure_parent_directory(db_path)?;

    let connection = Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .with_context(|| format!("failed to open index database: {}", db_path.display()))?;

    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL for index")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL for index")?;

    Ok(connection)
}

fn ensure_index_schema(connection: &Connection) -> Result<()> {
    connection.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS passages (
          index_name TEXT NOT NULL,
          passage_id TEXT NOT NULL,
          content TEXT NOT NULL,
          metadata_json TEXT NOT NULL,
          text_hash TEXT NOT NULL,
          model_id TEXT NOT NULL,
          embedding BLOB NOT NULL,
          embedding_dim INTEGER NOT NULL,
          indexed_at TEXT NOT NULL,
          PRIMARY KEY (index_name, passage_id)
        );

        CREATE INDEX IF NOT EXISTS idx_passages_index_model ON passages(index_name, model_id);
        ",
    )?;

    Ok(())
}

fn upsert_passages(
    connection: &mut Connection,
    index_name: &str,
    model_id: &str,
    passages: &[IndexedPassage],
) -> Result<usize> {
    let tx = connection.transaction()?;
    let mut written = 0usize;
    {
        let mut statement = tx.prepare(
            "
            INSERT INTO passages(index_name, passage_id, content, metadata_json, text_hash, model_id, embedding, embedding_dim, indexed_at)
            VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(index_name, passage_id) DO UPDATE SET
              content=excluded.content,
              metadata_json=excluded.metadata_json,
              text_hash=excluded.text_hash,
              model_id=excluded.model_id,
              embedding=excluded.embedding,
              embedding_dim=excluded.embedding_dim,
              indexed_at=excluded.indexed_at
            ",
        )?;

        let indexed_at = now_utc_string();
        for passage in passages {
            let metadata_json = serde_json::to_string(&passage.metadata)
                .with_context(|| format!("failed to serialize metadata for {}", passage.id))?;
            statement.execute(params![
                index_name,
                passage.id,
                passage.content,
                metadata_json,
                passage.text_hash,
                model_id,
                encode_embedding_blob(&passage.embedding),
                passage.embedding.len() as i64,
                indexed_at,
            ])?;
            written += 1;
        }
    }
    tx.commit()?;

    Ok(written)
}

fn search_passages(
    connection: &Connection,
    index_name: &str,
    model_id: &str,
    query_vector: &[f32],
    k: usize,
) -> Result<RankedList> {
    let mut statement = connection.prepare(
        "
        SELECT passage_id, content, metadata_json, embedding, embedding_dim
        FROM passages
        WHERE index_name = ?1 AND model_id = ?2
        ORDER BY rowid ASC
        ",
    )?;

    let mut rows = statement.query(params![index_name, model_id])?;
    let mut out = Vec::<ScoredDocument>::new();
    let mut skipped_dimension = 0usize;

    while let Some(row) = rows.next()? {
        let row_dim = row.get::<_, i64>(4)? as usize;
        if row_dim != query_vector.len() {
            skipped_dimension += 1;
            continue;
        }

        let embedding_blob = row.get::<_, Vec<u8>>(3)?;
        let Some(embedding) = decode_embedding_blob(&embedding_blob, row_dim) else {
            continue;
        };

        let metadata_json = row.get::<_, String>(2)?;
        let metadata = serde_json::from_str::<Map<String, Value>>(&metadata_json)
            .unwrap_or_default();

        out.push(ScoredDocument::new(
            Document {
                id: Some(row.get(0)?),
                content: row.get(1)?,
                metadata,
            },
            cosine_similarity(query_vector, &embedding),
        ));
    }

    if skipped_dimension > 0 {
        debug!(
            index = %index_name,
            skipped_dimension,
            "skipped passages with mismatched embedding dimensions"
        );
    }

    out.sort_by(|left, right| right.score.total_cmp(&left.score));
    out.truncate(k);
    Ok(out)
}

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Document {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: None,
            content: content.into(),
            metadata: Map::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Key used to recognize the same passage across independent retrieval
/// calls: the id when present and non-empty, otherwise the exact content.
pub fn identity_of(document: &Document) -> &str {
    match document.id.as_deref() {
        Some(id) if !id.is_empty() => id,
        _ => document.content.as_str(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument {
    pub document: Document,
    pub score: f64,
}

impl ScoredDocument {
    pub fn new(document: Document, score: f64) -> Self {
        Self { document, score }
    }
}

/// Results of one similarity search, in retriever order. Rank is the
/// 1-based position.
pub type RankedList = Vec<ScoredDocument>;

#[derive(Debug, Clone, PartialEq)]
pub struct QueryRanking {
    pub query: String,
    pub results: RankedList,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusedResult {
    pub document: Document,
    pub rrf_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskResponse {
    pub answer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassageRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexedPassage {
    pub id: String,
    pub content: String,
    pub metadata: Map<String, Value>,
    pub text_hash: String,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub backend: String,
    pub index_name: String,
    pub vector_count: u64,
}

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail, ensure};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::semantic::DEFAULT_LOCAL_DIMENSIONS;

pub const DEFAULT_CONFIG_PATH: &str = "docqa.toml";

pub const DEFAULT_CHAT_ENDPOINT: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_CHAT_MODEL: &str = "llama-3.1-70b-versatile";
pub const DEFAULT_EMBEDDING_ENDPOINT: &str = "https://api.openai.com/v1";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_PINECONE_CONTROL_ENDPOINT: &str = "https://api.pinecone.io";

pub const DEFAULT_EXPANSION_COUNT: usize = 2;
pub const DEFAULT_SEARCH_K: usize = 5;
pub const DEFAULT_TOP_N: usize = 5;
pub const DEFAULT_RRF_K: f64 = 1.0;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub chat: ChatConfig,
    pub embedding: EmbeddingConfig,
    pub index: IndexConfig,
    pub retrieval: RetrievalConfig,
    pub context: ContextConfig,
    pub prompts: PromptConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub api_key_env: String,
    pub temperature: Option<f32>,
    pub timeout_ms: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_CHAT_ENDPOINT.to_string(),
            model: DEFAULT_CHAT_MODEL.to_string(),
            api_key: None,
            api_key_env: "GROQ_API_KEY".to_string(),
            temperature: None,
            timeout_ms: 60_000,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize, ValueEnum)]
pub enum EmbeddingProvider {
    #[serde(rename = "openai")]
    #[value(name = "openai")]
    OpenAi,
    #[serde(rename = "local-hash")]
    LocalHash,
}

impl EmbeddingProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::LocalHash => "local-hash",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub api_key_env: String,
    pub dimensions: Option<usize>,
    pub batch_size: usize,
    pub timeout_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::OpenAi,
            endpoint: DEFAULT_EMBEDDING_ENDPOINT.to_string(),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            api_key: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            dimensions: None,
            batch_size: 64,
            timeout_ms: 30_000,
        }
    }
}

impl EmbeddingConfig {
    pub fn local_dimensions(&self) -> usize {
        self.dimensions.unwrap_or(DEFAULT_LOCAL_DIMENSIONS)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    Pinecone,
    Sqlite,
}

impl IndexBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pinecone => "pinecone",
            Self::Sqlite => "sqlite",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub backend: IndexBackend,
    pub name: String,
    pub host: Option<String>,
    pub control_endpoint: String,
    pub namespace: Option<String>,
    pub api_key: Option<String>,
    pub api_key_env: String,
    pub db_path: PathBuf,
    pub timeout_ms: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: IndexBackend::Pinecone,
            name: "docqa-passages".to_string(),
            host: None,
            control_endpoint: DEFAULT_PINECONE_CONTROL_ENDPOINT.to_string(),
            namespace: None,
            api_key: None,
            api_key_env: "PINECONE_API_KEY".to_string(),
            db_path: PathBuf::from(".cache/docqa/index.sqlite"),
            timeout_ms: 30_000,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalFailurePolicy {
    Abort,
    Skip,
}

impl RetrievalFailurePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Abort => "abort",
            Self::Skip => "skip",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub expansion_count: usize,
    pub search_k: usize,
    pub top_n: usize,
    pub rrf_k: f64,
    pub failure_policy: RetrievalFailurePolicy,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            expansion_count: DEFAULT_EXPANSION_COUNT,
            search_k: DEFAULT_SEARCH_K,
            top_n: DEFAULT_TOP_N,
            rrf_k: DEFAULT_RRF_K,
            failure_policy: RetrievalFailurePolicy::Abort,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub separator: String,
    pub excerpt_index: bool,
    pub max_chars: Option<usize>,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            separator: "\n".to_string(),
            excerpt_index: false,
            max_chars: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    pub expansion_system: String,
    pub expansion_user: String,
    pub answer_system: String,
    pub answer_user: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            expansion_system: "You are a helpful assistant that generates multiple search queries \
                to be run against official institutional documents, based on a single input query."
                .to_string(),
            expansion_user: "Generate {count} search queries related to: {query}. Return only the \
                list of queries, one per line, without numbering and without any additional text."
                .to_string(),
            answer_system: "You are a helpful assistant that answers questions users have about \
                documents."
                .to_string(),
            answer_user: "Answer the following question: {query}, based only on the following \
                context: {context}. If you do not have enough information to answer, just say \
                that you do not have enough information, without further justification."
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("failed to parse configuration toml")
    }

    /// Reads the configuration file, then fills unset API keys from the
    /// process environment. An explicit path must exist; the default path is
    /// optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::read_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_PATH);
                if default_path.exists() {
                    Self::read_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("invalid config file: {}", path.display()))
    }

    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let resolve = |current: &mut Option<String>, env_name: &str| {
            if current.as_deref().is_none_or(str::is_empty) {
                *current = lookup(env_name).filter(|value| !value.trim().is_empty());
            }
        };

        resolve(&mut self.chat.api_key, &self.chat.api_key_env);
        resolve(&mut self.embedding.api_key, &self.embedding.api_key_env);
        resolve(&mut self.index.api_key, &self.index.api_key_env);
    }

    pub fn validate(&self) -> Result<()> {
        let retrieval = &self.retrieval;
        ensure!(retrieval.top_n >= 1, "retrieval.top_n must be at least 1");
        ensure!(retrieval.search_k >= 1, "retrieval.search_k must be at least 1");
        ensure!(
            retrieval.rrf_k.is_finite() && retrieval.rrf_k > 0.0,
            "retrieval.rrf_k must be a positive finite number, got {}",
            retrieval.rrf_k
        );

        ensure!(!self.chat.endpoint.trim().is_empty(), "chat.endpoint must not be empty");
        ensure!(!self.chat.model.trim().is_empty(), "chat.model must not be empty");
        ensure!(self.embedding.batch_size >= 1, "embedding.batch_size must be at least 1");

        if self.embedding.provider == EmbeddingProvider::OpenAi {
            ensure!(
                !self.embedding.endpoint.trim().is_empty(),
                "embedding.endpoint must not be empty"
            );
            if self.embedding.api_key.is_none() {
                bail!(
                    "embedding provider 'openai' requires an api key (set embedding.api_key or {})",
                    self.embedding.api_key_env
                );
            }
        }

        if self.index.backend == IndexBackend::Pinecone {
            ensure!(!self.index.name.trim().is_empty(), "index.name must not be empty");
            if self.index.api_key.is_none() {
                bail!(
                    "index backend 'pinecone' requires an api key (set index.api_key or {})",
                    self.index.api_key_env
                );
            }
        }

        Ok(())
    }

    /// Chat key is checked separately: `upload`, `clear` and `status` never
    /// talk to the chat model.
    pub fn require_chat_key(&self) -> Result<()> {
        if self.chat.api_key.is_none() {
            bail!(
                "chat model requires an api key (set chat.api_key or {})",
                self.chat.api_key_env
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn empty_toml_loads_reference_defaults() {
        let config = AppConfig::from_toml("").expect("empty config should parse");
        assert_eq!(config.retrieval.expansion_count, 2);
        assert_eq!(config.retrieval.search_k, 5);
        assert_eq!(config.retrieval.top_n, 5);
        assert_eq!(config.retrieval.rrf_k, 1.0);
        assert_eq!(config.retrieval.failure_policy, RetrievalFailurePolicy::Abort);
        assert_eq!(config.context.separator, "\n");
        assert_eq!(config.index.backend, IndexBackend::Pinecone);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let raw = r#"
            [embedding]
            provider = "local-hash"
            dimensions = 128

            [index]
            backend = "sqlite"
            db_path = "/tmp/docqa.sqlite"

            [retrieval]
            rrf_k = 60
            failure_policy = "skip"
        "#;

        let config = AppConfig::from_toml(raw).expect("partial config should parse");
        assert_eq!(config.embedding.provider, EmbeddingProvider::LocalHash);
        assert_eq!(config.embedding.local_dimensions(), 128);
        assert_eq!(config.index.backend, IndexBackend::Sqlite);
        assert_eq!(config.retrieval.rrf_k, 60.0);
        assert_eq!(config.retrieval.failure_policy, RetrievalFailurePolicy::Skip);
        assert_eq!(config.retrieval.top_n, 5);
        assert_eq!(config.chat.model, DEFAULT_CHAT_MODEL);
        config.validate().expect("local config needs no remote keys");
    }

    #[test]
    fn env_fills_only_missing_keys() {
        let mut config = AppConfig::from_toml(
            r#"
            [chat]
            api_key = "from-file"
            "#,
        )
        .expect("config should parse");

        let env = HashMap::from([
            ("GROQ_API_KEY", "from-env-chat"),
            ("OPENAI_API_KEY", "from-env-embedding"),
            ("PINECONE_API_KEY", "  "),
        ]);
        config.apply_env(|name| env.get(name).map(|value| value.to_string()));

        assert_eq!(config.chat.api_key.as_deref(), Some("from-file"));
        assert_eq!(config.embedding.api_key.as_deref(), Some("from-env-embedding"));
        assert!(config.index.api_key.is_none());
    }

    #[test]
    fn validate_rejects_non_positive_rrf_constant() {
        let mut config = AppConfig::from_toml(
            r#"
            [embedding]
            provider = "local-hash"
            [index]
            backend = "sqlite"
            "#,
        )
        .expect("config should parse");

        config.retrieval.rrf_k = 0.0;
        assert!(config.validate().is_err());
        config.retrieval.rrf_k = f64::NAN;
        assert!(config.validate().is_err());
        config.retrieval.rrf_k = 1.0;
        config.retrieval.top_n = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_requires_remote_keys() {
        let config = AppConfig::default();
        let err = config.validate().expect_err("default remote config lacks keys");
        assert!(err.to_string().contains("OPENAI_API_KEY"));
        assert!(config.require_chat_key().is_err());
    }
}

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::{AppConfig, EmbeddingProvider, IndexBackend, RetrievalFailurePolicy};

#[derive(Parser, Debug)]
#[command(
    name = "docqa",
    version,
    about = "Question answering over indexed documents with query expansion and rank fusion"
)]
pub struct Cli {
    /// Configuration file. Defaults to ./docqa.toml when present.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, value_enum)]
    pub index_backend: Option<IndexBackend>,

    #[arg(long, global = true, value_enum)]
    pub embedding_provider: Option<EmbeddingProvider>,

    #[arg(long, global = true)]
    pub index_name: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Ask(AskArgs),
    Serve(ServeArgs),
    Upload(UploadArgs),
    Clear(ClearArgs),
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct AskArgs {
    #[arg(long)]
    pub query: String,

    #[arg(long)]
    pub expansion_count: Option<usize>,

    #[arg(long)]
    pub search_k: Option<usize>,

    #[arg(long)]
    pub top_n: Option<usize>,

    #[arg(long)]
    pub rrf_k: Option<f64>,

    #[arg(long, value_enum)]
    pub on_retrieval_failure: Option<RetrievalFailurePolicy>,

    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Also print the search queries and fused passages.
    #[arg(long, default_value_t = false)]
    pub explain: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    #[arg(long)]
    pub bind: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct UploadArgs {
    /// JSON Lines file, one `{"id", "content", "metadata"}` passage per line.
    #[arg(long)]
    pub input: PathBuf,

    #[arg(long)]
    pub batch_size: Option<usize>,
}

#[derive(Args, Debug, Clone)]
pub struct ClearArgs {
    #[arg(long, default_value_t = false)]
    pub yes: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value_t = false)]
    pub skip_index: bool,
}

impl Cli {
    pub fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(backend) = self.index_backend {
            config.index.backend = backend;
        }
        if let Some(provider) = self.embedding_provider {
            config.embedding.provider = provider;
        }
        if let Some(name) = &self.index_name {
            config.index.name = name.clone();
        }

        match &self.command {
            Commands::Ask(args) => args.apply_overrides(config),
            Commands::Serve(args) => {
                if let Some(bind) = &args.bind {
                    config.server.bind = bind.clone();
                }
            }
            Commands::Upload(args) => {
                if let Some(batch_size) = args.batch_size {
                    config.embedding.batch_size = batch_size;
                }
            }
            Commands::Clear(_) | Commands::Status(_) => {}
        }
    }
}

impl AskArgs {
    fn apply_overrides(&self, config: &mut AppConfig) {
        let retrieval = &mut config.retrieval;
        if let Some(count) = self.expansion_count {
            retrieval.expansion_count = count;
        }
        if let Some(search_k) = self.search_k {
            retrieval.search_k = search_k;
        }
        if let Some(top_n) = self.top_n {
            retrieval.top_n = top_n;
        }
        if let Some(rrf_k) = self.rrf_k {
            retrieval.rrf_k = rrf_k;
        }
        if let Some(policy) = self.on_retrieval_failure {
            retrieval.failure_policy = policy;
        }
    }
}

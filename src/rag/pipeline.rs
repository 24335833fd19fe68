use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::Serialize;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::config::{AppConfig, RetrievalFailurePolicy};
use crate::error::{PipelineError, Stage};
use crate::model::{FusedResult, QueryRanking};
use crate::providers::{ChatModel, Retriever};

use super::context::ContextAssembler;
use super::expansion::{QueryExpander, build_query_set};
use super::fusion::{FusionParams, fuse};
use super::synthesis::AnswerSynthesizer;

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub expansion_count: usize,
    pub search_k: usize,
    pub fusion: FusionParams,
    pub failure_policy: RetrievalFailurePolicy,
    pub expansion_timeout: Duration,
    pub retrieval_timeout: Duration,
    pub synthesis_timeout: Duration,
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        // A retrieval is one embedding call followed by one index query.
        let retrieval_ms = config
            .embedding
            .timeout_ms
            .saturating_add(config.index.timeout_ms);

        Self {
            expansion_count: config.retrieval.expansion_count,
            search_k: config.retrieval.search_k,
            fusion: FusionParams {
                top_n: config.retrieval.top_n,
                rrf_k: config.retrieval.rrf_k,
            },
            failure_policy: config.retrieval.failure_policy,
            expansion_timeout: Duration::from_millis(config.chat.timeout_ms),
            retrieval_timeout: Duration::from_millis(retrieval_ms),
            synthesis_timeout: Duration::from_millis(config.chat.timeout_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AskOutcome {
    pub answer: String,
    pub queries: Vec<String>,
    pub skipped_queries: Vec<String>,
    pub sources: Vec<FusedResult>,
    pub context_chars: usize,
}

pub struct AskPipeline {
    expander: QueryExpander,
    retriever: Arc<dyn Retriever>,
    assembler: ContextAssembler,
    synthesizer: AnswerSynthesizer,
    settings: PipelineSettings,
}

impl AskPipeline {
    pub fn new(
        chat: Arc<dyn ChatModel>,
        retriever: Arc<dyn Retriever>,
        config: &AppConfig,
    ) -> Self {
        Self::with_settings(chat, retriever, config, PipelineSettings::from_config(config))
    }

    pub fn with_settings(
        chat: Arc<dyn ChatModel>,
        retriever: Arc<dyn Retriever>,
        config: &AppConfig,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            expander: QueryExpander::new(chat.clone(), &config.prompts),
            retriever,
            assembler: ContextAssembler::new(&config.context),
            synthesizer: AnswerSynthesizer::new(chat, &config.prompts),
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub async fn ask(&self, question: &str) -> Result<AskOutcome, PipelineError> {
        let started = Instant::now();

        let expanded = within(
            Stage::Expansion,
            self.settings.expansion_timeout,
            self.expander.expand(question, self.settings.expansion_count),
        )
        .await?
        .map_err(PipelineError::Expansion)?;
        let queries = build_query_set(expanded, question);
        info!(query_count = queries.len(), "search queries prepared");

        let (rankings, skipped_queries) = self.retrieve_all(&queries).await?;
        let sources = fuse(&rankings, self.settings.fusion);
        let context = self.assembler.assemble(&sources);
        let context_chars = context.chars().count();
        info!(
            fused = sources.len(),
            context_chars,
            skipped = skipped_queries.len(),
            "grounding context assembled"
        );

        let answer = within(
            Stage::Synthesis,
            self.settings.synthesis_timeout,
            self.synthesizer.synthesize(question, &context),
        )
        .await?
        .map_err(PipelineError::Synthesis)?;

        info!(
            duration_ms = started.elapsed().as_millis() as u64,
            answer_chars = answer.chars().count(),
            "answer synthesized"
        );

        Ok(AskOutcome {
            answer,
            queries,
            skipped_queries,
            sources,
            context_chars,
        })
    }

    /// Searches every query concurrently. Output keeps query-set order, which
    /// fixes the discovery order fusion uses for ties.
    async fn retrieve_all(
        &self,
        queries: &[String],
    ) -> Result<(Vec<QueryRanking>, Vec<String>), PipelineError> {
        let searches = queries.iter().map(|query| {
            within(
                Stage::Retrieval,
                self.settings.retrieval_timeout,
                self.retriever.search(query, self.settings.search_k),
            )
        });
        let outcomes = join_all(searches).await;

        let mut rankings = Vec::<QueryRanking>::with_capacity(queries.len());
        let mut skipped = Vec::<String>::new();

        for (query, outcome) in queries.iter().zip(outcomes) {
            let failure = match outcome {
                Ok(Ok(results)) => {
                    rankings.push(QueryRanking {
                        query: query.clone(),
                        results,
                    });
                    continue;
                }
                Ok(Err(source)) => PipelineError::Retrieval {
                    query: query.clone(),
                    source,
                },
                Err(timed_out) => timed_out,
            };

            match self.settings.failure_policy {
                RetrievalFailurePolicy::Abort => return Err(failure),
                RetrievalFailurePolicy::Skip => {
                    warn!(
                        query = %query,
                        error = %failure,
                        "retrieval failed; continuing without this query"
                    );
                    skipped.push(query.clone());
                    rankings.push(QueryRanking {
                        query: query.clone(),
                        results: Vec::new(),
                    });
                }
            }
        }

        Ok((rankings, skipped))
    }
}

async fn within<T>(
    stage: Stage,
    limit: Duration,
    future: impl Future<Output = T>,
) -> Result<T, PipelineError> {
    timeout(limit, future).await.map_err(|_| PipelineError::Timeout {
        stage,
        elapsed: limit,
    })
}

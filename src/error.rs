use std::time::Duration;

/// Failures of one ask request. Every variant is fatal to the request; the
/// caller decides how to surface it.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("query expansion failed")]
    Expansion(#[source] anyhow::Error),

    #[error("retrieval failed for query '{query}'")]
    Retrieval {
        query: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("answer synthesis failed")]
    Synthesis(#[source] anyhow::Error),

    #[error("{stage} timed out after {}ms", .elapsed.as_millis())]
    Timeout { stage: Stage, elapsed: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Expansion,
    Retrieval,
    Synthesis,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Expansion => "query expansion",
            Self::Retrieval => "retrieval",
            Self::Synthesis => "answer synthesis",
        };
        f.write_str(name)
    }
}

impl PipelineError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

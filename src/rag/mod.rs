//! Ask pipeline: expand the question, search every query, fuse the ranked
//! lists, then answer from the fused passages.

mod context;
mod expansion;
mod fusion;
mod pipeline;
mod prompt;
mod synthesis;

#[cfg(test)]
pub(crate) mod testing;

pub use fusion::FusionParams;
pub use pipeline::{AskOutcome, AskPipeline, PipelineSettings};

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use crate::config::PromptConfig;
use crate::providers::{ChatMessage, ChatModel};

use super::prompt::render;

pub struct QueryExpander {
    chat: Arc<dyn ChatModel>,
    system_instruction: String,
    user_template: String,
}

impl QueryExpander {
    pub fn new(chat: Arc<dyn ChatModel>, prompts: &PromptConfig) -> Self {
        Self {
            chat,
            system_instruction: prompts.expansion_system.clone(),
            user_template: prompts.expansion_user.clone(),
        }
    }

    /// Asks the model for `count` alternative search queries. Every reply line
    /// is one query, blank lines included. A count of zero skips the model.
    pub async fn expand(&self, question: &str, count: usize) -> Result<Vec<String>> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let count_text = count.to_string();
        let messages = [
            ChatMessage::system(self.system_instruction.clone()),
            ChatMessage::user(render(
                &self.user_template,
                &[("count", count_text.as_str()), ("query", question)],
            )),
        ];

        let reply = self.chat.complete(&messages).await?;
        let queries = parse_expanded_queries(&reply);
        debug!(requested = count, produced = queries.len(), "query expansion reply parsed");
        Ok(queries)
    }
}

pub fn parse_expanded_queries(reply: &str) -> Vec<String> {
    reply
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
        .collect()
}

/// Expanded queries followed by the literal question. Results are keyed by
/// query text, so a repeated query keeps only its first position.
pub fn build_query_set(expanded: Vec<String>, question: &str) -> Vec<String> {
    let mut seen = HashSet::<String>::new();
    expanded
        .into_iter()
        .chain(std::iter::once(question.to_string()))
        .filter(|query| seen.insert(query.clone()))
        .collect()
}

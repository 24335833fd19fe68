use std::sync::Arc;

use anyhow::Result;

use crate::config::PromptConfig;
use crate::providers::{ChatMessage, ChatModel};

use super::prompt::render;

pub struct AnswerSynthesizer {
    chat: Arc<dyn ChatModel>,
    system_instruction: String,
    user_template: String,
}

impl AnswerSynthesizer {
    pub fn new(chat: Arc<dyn ChatModel>, prompts: &PromptConfig) -> Self {
        Self {
            chat,
            system_instruction: prompts.answer_system.clone(),
            user_template: prompts.answer_user.clone(),
        }
    }

    /// Returns the model reply untouched. An empty context is still sent; the
    /// instruction tells the model to admit it lacks information.
    pub async fn synthesize(&self, question: &str, context: &str) -> Result<String> {
        let messages = [
            ChatMessage::system(self.system_instruction.clone()),
            ChatMessage::user(render(
                &self.user_template,
                &[("query", question), ("context", context)],
            )),
        ];

        self.chat.complete(&messages).await
    }
}

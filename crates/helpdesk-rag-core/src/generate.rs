//! Grounded answer generation.
//!
//! The retrieved passages are stuffed into a system prompt template at the
//! `{context}` placeholder; the chat history and the user's original question
//! follow as messages. The model's reply is returned as-is.

use std::sync::Arc;

use tracing::debug;

use crate::error::RagError;
use crate::index::SearchHit;
use crate::llm::ChatModel;
use crate::models::Turn;

/// Placeholder replaced by the retrieved passages.
pub const CONTEXT_PLACEHOLDER: &str = "{context}";

/// Customer-support persona used when no prompt is configured.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a highly intelligent and professional \
customer support assistant for Samsung products. Your goal is to assist customers with \
their queries in a friendly, polite, and efficient manner. Use the following pieces of \
retrieved context and chat history to answer the question. If you don't know the answer, \
just say that you don't know. Use three sentences maximum and keep the answer concise. \
Ask a follow up question to the user.

{context}";

/// Produces the final answer from passages, history and question.
pub struct AnswerGenerator {
    model: Arc<dyn ChatModel>,
    template: String,
}

impl AnswerGenerator {
    /// Uses [`DEFAULT_SYSTEM_PROMPT`].
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self {
            model,
            template: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    /// Use a custom system prompt. It must contain `{context}`.
    pub fn with_template(
        model: Arc<dyn ChatModel>,
        template: impl Into<String>,
    ) -> Result<Self, RagError> {
        let template = template.into();
        if !template.contains(CONTEXT_PLACEHOLDER) {
            return Err(RagError::InvalidPrompt(format!(
                "must contain the {} placeholder",
                CONTEXT_PLACEHOLDER
            )));
        }
        Ok(Self { model, template })
    }

    /// The system prompt with `passages` substituted for `{context}`.
    pub fn render_system_prompt(&self, passages: &[SearchHit]) -> String {
        let context = passages
            .iter()
            .map(|hit| hit.chunk.text.trim())
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        self.template.replace(CONTEXT_PLACEHOLDER, &context)
    }

    pub async fn generate(
        &self,
        passages: &[SearchHit],
        history: &[Turn],
        question: &str,
    ) -> Result<String, RagError> {
        let system = self.render_system_prompt(passages);

        let mut messages = history.to_vec();
        messages.push(Turn::user(question));

        debug!(
            passages = passages.len(),
            history = history.len(),
            model = self.model.model_name(),
            "generating answer"
        );

        self.model
            .complete(&system, &messages)
            .await
            .map_err(RagError::generation)
    }
}

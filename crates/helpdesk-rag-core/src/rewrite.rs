//! History-aware query rewriting.
//!
//! A follow-up such as "how long does it last?" is useless as a retrieval
//! query on its own. [`QueryRewriter`] asks the chat model to turn the latest
//! question plus the conversation so far into a standalone question. It is
//! told to reformulate only, never to answer.

use std::sync::Arc;

use tracing::debug;

use crate::error::RagError;
use crate::llm::ChatModel;
use crate::models::Turn;

/// Instruction given to the model for contextualisation.
pub const CONTEXTUALIZE_PROMPT: &str = "Given a chat history and the latest user question \
which might reference context in the chat history, formulate a standalone question \
which can be understood without the chat history. Do NOT answer the question, \
just reformulate it if needed and otherwise return it as is.";

/// Rewrites follow-up questions into standalone ones.
pub struct QueryRewriter {
    model: Arc<dyn ChatModel>,
    prompt: String,
}

impl QueryRewriter {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self {
            model,
            prompt: CONTEXTUALIZE_PROMPT.to_string(),
        }
    }

    /// Replace the contextualisation instruction.
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// Produce a standalone question.
    ///
    /// With empty history the question is returned unchanged and the model
    /// is not called. A blank model response falls back to the original
    /// question.
    pub async fn rewrite(&self, history: &[Turn], question: &str) -> Result<String, RagError> {
        if history.is_empty() {
            return Ok(question.to_string());
        }

        let mut messages = history.to_vec();
        messages.push(Turn::user(question));

        let rewritten = self
            .model
            .complete(&self.prompt, &messages)
            .await
            .map_err(RagError::generation)?;

        let rewritten = rewritten.trim();
        if rewritten.is_empty() {
            debug!("rewriter returned blank output, keeping original question");
            return Ok(question.to_string());
        }

        debug!(original = question, standalone = rewritten, "rewrote question");
        Ok(rewritten.to_string())
    }
}

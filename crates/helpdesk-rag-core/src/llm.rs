//! Chat model abstraction.
//!
//! Both the query rewriter and the answer generator talk to a generative
//! model through [`ChatModel`]. The app crate provides an
//! OpenAI-compatible HTTP implementation; tests supply scripted fakes.

use async_trait::async_trait;

use crate::models::Turn;

/// A generative chat model: system prompt plus ordered messages in, text out.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Identifier reported in logs (e.g. `"llama3-8b-8192"`).
    fn model_name(&self) -> &str;

    /// Complete one exchange. Implementations return the assistant message
    /// content exactly as produced.
    async fn complete(&self, system: &str, messages: &[Turn]) -> anyhow::Result<String>;
}

#[async_trait]
impl<M: ChatModel + ?Sized> ChatModel for std::sync::Arc<M> {
    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    async fn complete(&self, system: &str, messages: &[Turn]) -> anyhow::Result<String> {
        (**self).complete(system, messages).await
    }
}

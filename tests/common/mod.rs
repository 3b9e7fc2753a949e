//! In-process fakes shared by the integration tests.
//!
//! - [`KeywordEmbedder`]: one dimension per support topic, so similarity is
//!   predictable without downloading a model.
//! - [`ScriptedChat`]: answers rewrite requests and generation requests by
//!   rule, records every call, and can be told to fail.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use helpdesk_rag::config::Config;
use helpdesk_rag::conversation::Conversation;
use helpdesk_rag_core::embedding::EmbeddingProvider;
use helpdesk_rag_core::llm::ChatModel;
use helpdesk_rag_core::rewrite::CONTEXTUALIZE_PROMPT;
use helpdesk_rag_core::{Role, Turn};

pub const KEYWORDS: &[&str] = &[
    "warranty", "shipping", "return", "remote", "battery", "screen", "refund", "delivery",
];

pub const FAQ_CSV: &str = "\
question,answer
What is the warranty period for Samsung TVs?,Samsung TVs come with a one-year limited warranty. The warranty covers manufacturing defects.
How long does shipping take?,Standard shipping takes 3 to 5 business days.
What is the return policy?,You can return products within 30 days. A return label is emailed to you.
How do I pair my remote?,Hold the remote pairing button for 3 seconds near the TV.
";

/// Counts topic keywords; the last dimension is a constant bias so no text
/// maps to the zero vector.
pub struct KeywordEmbedder;

pub fn keyword_vector(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    let mut v: Vec<f32> = KEYWORDS
        .iter()
        .map(|k| lower.matches(k).count() as f32)
        .collect();
    v.push(0.1);
    v
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    fn model_name(&self) -> &str {
        "keyword-test"
    }

    fn dims(&self) -> usize {
        KEYWORDS.len() + 1
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| keyword_vector(t)).collect())
    }
}

/// [`KeywordEmbedder`] that can be switched to fail after the index is built.
#[derive(Default)]
pub struct SwitchableEmbedder {
    pub fail: AtomicBool,
}

#[async_trait]
impl EmbeddingProvider for SwitchableEmbedder {
    fn model_name(&self) -> &str {
        "keyword-test"
    }

    fn dims(&self) -> usize {
        KEYWORDS.len() + 1
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("embedding service unavailable");
        }
        Ok(texts.iter().map(|t| keyword_vector(t)).collect())
    }
}

/// One recorded chat call.
#[derive(Debug, Clone)]
pub struct Call {
    pub system: String,
    pub messages: Vec<Turn>,
}

impl Call {
    pub fn is_rewrite(&self) -> bool {
        self.system == CONTEXTUALIZE_PROMPT
    }
}

#[derive(Default)]
pub struct ScriptedChat {
    pub calls: Mutex<Vec<Call>>,
    pub fail_generation: AtomicBool,
    pub fail_rewrite: AtomicBool,
    pub delay: Option<Duration>,
}

impl ScriptedChat {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Self::default()
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn rewrite_calls(&self) -> usize {
        self.calls().iter().filter(|c| c.is_rewrite()).count()
    }
}

fn last_user(messages: &[Turn]) -> String {
    messages
        .iter()
        .rev()
        .find(|t| t.role == Role::User)
        .map(|t| t.content.clone())
        .unwrap_or_default()
}

#[async_trait]
impl ChatModel for ScriptedChat {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, system: &str, messages: &[Turn]) -> Result<String> {
        self.calls.lock().unwrap().push(Call {
            system: system.to_string(),
            messages: messages.to_vec(),
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let question = last_user(messages);

        if system == CONTEXTUALIZE_PROMPT {
            if self.fail_rewrite.load(Ordering::SeqCst) {
                anyhow::bail!("rewrite timed out");
            }
            // Resolve the follow-up against the first question of the conversation.
            let topic = messages
                .iter()
                .find(|t| t.role == Role::User)
                .map(|t| t.content.clone())
                .unwrap_or_default();
            return Ok(format!("{} (follow-up to: {})", question, topic));
        }

        if self.fail_generation.load(Ordering::SeqCst) {
            anyhow::bail!("model overloaded");
        }

        let base = if system.contains("one-year limited warranty") {
            "Your TV has a one-year limited warranty covering manufacturing defects."
        } else {
            "I don't know."
        };
        Ok(format!("{} [re: {}]", base, question))
    }
}

/// Config pointing at `root`, with the given retrieval depth.
pub fn test_config(root: &Path, k: usize) -> Config {
    let mut config = Config::default();
    config.corpus.root = root.to_path_buf();
    config.retrieval.k = k;
    config
}

pub fn write_faq(dir: &Path) {
    std::fs::write(dir.join("faq.csv"), FAQ_CSV).unwrap();
}

pub async fn conversation(root: &Path, k: usize, chat: Arc<ScriptedChat>) -> Conversation {
    conversation_with(&test_config(root, k), Arc::new(KeywordEmbedder), chat).await
}

pub async fn conversation_with(
    config: &Config,
    embedder: Arc<dyn EmbeddingProvider>,
    chat: Arc<ScriptedChat>,
) -> Conversation {
    Conversation::build(config, embedder, chat).await.unwrap()
}

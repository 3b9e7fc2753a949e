//! Error taxonomy shared by every stage of the pipeline.
//!
//! Startup failures (`UnsupportedFormat`, `Ingest`, `EmptyCorpus`,
//! `InvalidChunking`, `InvalidPrompt`) are fatal: the service must not start
//! without an index and a usable prompt.
//! Request-time failures (`Embedding`, `Generation`, mismatches) abort the
//! current request only and leave the session transcript untouched.
//!
//! There is deliberately no "session not found" variant: unknown session
//! identifiers start a fresh conversation.

use std::path::PathBuf;

/// Errors produced by ingestion, indexing, and the conversational stages.
#[derive(Debug, thiserror::Error)]
pub enum RagError {
    #[error("unsupported corpus file format: {0} (only .pdf and .csv are allowed)")]
    UnsupportedFormat(PathBuf),

    #[error("failed to ingest {path}: {message}")]
    Ingest { path: PathBuf, message: String },

    #[error("corpus is empty: no chunks to index")]
    EmptyCorpus,

    #[error("invalid chunking parameters: {0}")]
    InvalidChunking(String),

    #[error("invalid system prompt: {0}")]
    InvalidPrompt(String),

    #[error("embedding backend failed: {0}")]
    Embedding(String),

    #[error("embedding dimension mismatch: index has {expected}, query has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding model mismatch: index built with '{index}', query embedder is '{query}'")]
    ModelMismatch { index: String, query: String },

    #[error("generative model failed: {0}")]
    Generation(String),

    #[error("question must not be empty")]
    EmptyQuestion,
}

impl RagError {
    /// True for errors that can only happen while starting up.
    pub fn is_startup(&self) -> bool {
        matches!(
            self,
            RagError::UnsupportedFormat(_)
                | RagError::Ingest { .. }
                | RagError::EmptyCorpus
                | RagError::InvalidChunking(_)
                | RagError::InvalidPrompt(_)
        )
    }

    pub(crate) fn embedding(err: anyhow::Error) -> Self {
        RagError::Embedding(format!("{:#}", err))
    }

    pub(crate) fn generation(err: anyhow::Error) -> Self {
        RagError::Generation(format!("{:#}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = RagError::UnsupportedFormat(PathBuf::from("manual.docx"));
        assert_eq!(
            err.to_string(),
            "unsupported corpus file format: manual.docx (only .pdf and .csv are allowed)"
        );

        let err = RagError::DimensionMismatch {
            expected: 384,
            actual: 768,
        };
        assert_eq!(
            err.to_string(),
            "embedding dimension mismatch: index has 384, query has 768"
        );

        assert_eq!(
            RagError::EmptyCorpus.to_string(),
            "corpus is empty: no chunks to index"
        );
    }

    #[test]
    fn test_startup_classification() {
        assert!(RagError::EmptyCorpus.is_startup());
        assert!(RagError::UnsupportedFormat(PathBuf::from("a.txt")).is_startup());
        assert!(RagError::InvalidPrompt("missing {context}".into()).is_startup());
        assert!(!RagError::Generation("timeout".into()).is_startup());
        assert!(!RagError::EmptyQuestion.is_startup());
    }

    #[test]
    fn test_wrapped_anyhow_keeps_context_chain() {
        let inner = anyhow::anyhow!("connection refused").context("POST /chat/completions");
        let err = RagError::generation(inner);
        let msg = err.to_string();
        assert!(msg.contains("POST /chat/completions"));
        assert!(msg.contains("connection refused"));
    }
}

//! Per-request pipeline and startup wiring.
//!
//! [`Conversation::answer`] runs, in order:
//!
//! ```text
//! FetchHistory → RewriteQuery → Retrieve → Generate → PersistTurns → Done
//! ```
//!
//! The session lock is held from `FetchHistory` until `PersistTurns`, so
//! concurrent requests on one session are serialised and every user turn is
//! immediately followed by its assistant turn. Any failure aborts the request
//! before `PersistTurns`, leaving the transcript untouched. While the lock is
//! held the session cannot be evicted or expired from the store.

use anyhow::{Context, Result};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use helpdesk_rag_core::chunk::{chunk_documents, ChunkingParams};
use helpdesk_rag_core::embedding::EmbeddingProvider;
use helpdesk_rag_core::generate::AnswerGenerator;
use helpdesk_rag_core::index::{EmbeddingIndex, SearchHit};
use helpdesk_rag_core::llm::ChatModel;
use helpdesk_rag_core::retrieve::Retriever;
use helpdesk_rag_core::rewrite::QueryRewriter;
use helpdesk_rag_core::{Chunk, Document, RagError};

use crate::config::Config;
use crate::ingest::{discover_corpus, load_documents};
use crate::session::{SessionPolicy, SessionStore};

/// Pipeline stage, reported in traces and failure logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    FetchHistory,
    RewriteQuery,
    Retrieve,
    Generate,
    PersistTurns,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::FetchHistory => "fetch_history",
            Stage::RewriteQuery => "rewrite_query",
            Stage::Retrieve => "retrieve",
            Stage::Generate => "generate",
            Stage::PersistTurns => "persist_turns",
            Stage::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one successful request.
#[derive(Debug, Clone)]
pub struct Answer {
    pub answer: String,
    /// The query actually used for retrieval.
    pub standalone_question: String,
    /// Every turn content of the session after this exchange, oldest first.
    pub transcript: Vec<String>,
    pub sources: Vec<SearchHit>,
}

/// Corpus after ingestion and chunking, before embedding.
pub struct PreparedCorpus {
    pub files: Vec<PathBuf>,
    pub documents: Vec<Document>,
    pub chunks: Vec<Chunk>,
}

/// Discover, load and chunk the configured corpus.
pub fn prepare_corpus(config: &Config) -> Result<PreparedCorpus> {
    let files = discover_corpus(&config.corpus)?;
    let documents = load_documents(&files)?;
    let params = ChunkingParams::new(config.chunking.chunk_size, config.chunking.overlap)?;
    let chunks = chunk_documents(&documents, &params);

    info!(
        files = files.len(),
        documents = documents.len(),
        chunks = chunks.len(),
        chunk_size = params.chunk_size(),
        overlap = params.overlap(),
        "corpus prepared"
    );

    Ok(PreparedCorpus {
        files,
        documents,
        chunks,
    })
}

/// Prepare the corpus and embed it.
pub async fn build_index(
    config: &Config,
    provider: &dyn EmbeddingProvider,
) -> Result<EmbeddingIndex> {
    let corpus = prepare_corpus(config)?;
    let started = Instant::now();
    let index = EmbeddingIndex::build(corpus.chunks, provider, config.embedding.batch_size)
        .await
        .context("Failed to build embedding index")?;
    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        "index ready"
    );
    Ok(index)
}

/// The conversational question-answering service.
pub struct Conversation {
    sessions: Arc<SessionStore>,
    rewriter: QueryRewriter,
    retriever: Retriever,
    generator: AnswerGenerator,
}

impl Conversation {
    pub fn new(
        sessions: Arc<SessionStore>,
        rewriter: QueryRewriter,
        retriever: Retriever,
        generator: AnswerGenerator,
    ) -> Self {
        Self {
            sessions,
            rewriter,
            retriever,
            generator,
        }
    }

    /// Build the index from the configured corpus and assemble every stage.
    ///
    /// Fails if the corpus is empty, contains unsupported files, or cannot
    /// be embedded.
    pub async fn build(
        config: &Config,
        provider: Arc<dyn EmbeddingProvider>,
        chat: Arc<dyn ChatModel>,
    ) -> Result<Self> {
        let index = build_index(config, provider.as_ref()).await?;
        Self::from_index(config, Arc::new(index), provider, chat)
    }

    /// Assemble the stages around an already built index.
    pub fn from_index(
        config: &Config,
        index: Arc<EmbeddingIndex>,
        provider: Arc<dyn EmbeddingProvider>,
        chat: Arc<dyn ChatModel>,
    ) -> Result<Self> {
        let retriever = Retriever::new(index, provider, config.retrieval.k)?;
        let generator = match &config.assistant.system_prompt {
            Some(prompt) => AnswerGenerator::with_template(Arc::clone(&chat), prompt.clone())?,
            None => AnswerGenerator::new(Arc::clone(&chat)),
        };
        let rewriter = QueryRewriter::new(chat);
        let sessions = Arc::new(SessionStore::new(SessionPolicy::from_config(
            &config.sessions,
        )));

        Ok(Self::new(sessions, rewriter, retriever, generator))
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Number of chunks in the index.
    pub fn indexed_chunks(&self) -> usize {
        self.retriever.index().len()
    }

    /// Answer `question` in the context of session `session_id`.
    ///
    /// On success the question and answer are appended to the session as a
    /// user/assistant pair. On failure the session is unchanged.
    pub async fn answer(&self, question: &str, session_id: &str) -> Result<Answer, RagError> {
        if question.trim().is_empty() {
            return Err(RagError::EmptyQuestion);
        }

        let started = Instant::now();
        let session = self.sessions.get_or_create(session_id);
        let mut guard = session.lock().await;

        let trace = |stage: Stage| {
            debug!(
                session = session_id,
                stage = %stage,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "stage"
            );
        };
        let fail = |stage: Stage, err: RagError| {
            warn!(session = session_id, stage = %stage, error = %err, "request failed");
            err
        };

        trace(Stage::FetchHistory);
        let history = guard.turns().to_vec();

        trace(Stage::RewriteQuery);
        let standalone = self
            .rewriter
            .rewrite(&history, question)
            .await
            .map_err(|e| fail(Stage::RewriteQuery, e))?;

        trace(Stage::Retrieve);
        let hits = self
            .retriever
            .retrieve(&standalone)
            .await
            .map_err(|e| fail(Stage::Retrieve, e))?;

        trace(Stage::Generate);
        let answer = self
            .generator
            .generate(&hits, &history, question)
            .await
            .map_err(|e| fail(Stage::Generate, e))?;

        trace(Stage::PersistTurns);
        guard.push_exchange(question, answer.clone());
        let transcript = guard.transcript();
        drop(guard);
        self.sessions.touch(session_id);

        trace(Stage::Done);
        info!(
            session = session_id,
            turns = transcript.len(),
            passages = hits.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "answered"
        );

        Ok(Answer {
            answer,
            standalone_question: standalone,
            transcript,
            sources: hits,
        })
    }
}

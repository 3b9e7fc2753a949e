//! # Helpdesk RAG
//!
//! A conversational helpdesk that answers customer questions from a fixed
//! corpus of PDF manuals and CSV FAQs.
//!
//! Each user turn is rewritten into a standalone question using the session's
//! chat history, relevant passages are retrieved from an in-memory embedding
//! index, and a chat model answers from those passages under a
//! customer-support persona.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────────┐
//! │   Corpus     │──▶│ Chunk+Embed  │──▶│  EmbeddingIndex  │
//! │  PDF / CSV   │   │  (startup)   │   │   (read-only)    │
//! └──────────────┘   └──────────────┘   └────────┬─────────┘
//!                                                │
//!      question ──▶ Rewrite ──▶ Retrieve ◀───────┘
//!                     │            │
//!   SessionStore ◀────┴─ Generate ◀┘ ──▶ answer
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export GROQ_API_KEY=...
//! helpdesk index --dry-run          # check the corpus
//! helpdesk ask "What is the warranty on my TV?"
//! helpdesk chat                     # interactive session
//! helpdesk serve                    # HTTP API on :5000
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`ingest`] | Corpus discovery, PDF and CSV loading |
//! | [`embedding`] | Local, OpenAI and Ollama embedding providers |
//! | [`llm`] | OpenAI-compatible chat client and retry layer |
//! | [`session`] | Per-session conversation state |
//! | [`conversation`] | Per-request pipeline and startup wiring |
//! | [`server`] | HTTP API |
//!
//! Pure pipeline pieces (chunker, index, rewriter, retriever, generator) live
//! in the `helpdesk-rag-core` crate.

pub mod config;
pub mod conversation;
pub mod embedding;
pub mod ingest;
pub mod llm;
pub mod logging;
pub mod server;
pub mod session;

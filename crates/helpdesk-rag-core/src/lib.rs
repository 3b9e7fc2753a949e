//! # helpdesk-rag core
//!
//! Runtime-agnostic building blocks for conversational retrieval-augmented
//! generation: data models, the recursive chunker, the embedding index, and
//! the three per-request stages (query rewrite, retrieval, answer generation).
//!
//! This crate contains no tokio, filesystem, or network code. Embedding and
//! chat backends are reached through the [`embedding::EmbeddingProvider`] and
//! [`llm::ChatModel`] traits, which the `helpdesk-rag` app crate implements.
//!
//! ## Per-request flow
//!
//! ```text
//! history + question ──▶ QueryRewriter ──▶ Retriever ──▶ AnswerGenerator ──▶ answer
//!                        (ChatModel)      (Index)       (ChatModel)
//! ```

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod generate;
pub mod index;
pub mod llm;
pub mod models;
pub mod retrieve;
pub mod rewrite;

pub use error::RagError;
pub use models::{Chunk, Document, DocumentKind, Role, Turn};

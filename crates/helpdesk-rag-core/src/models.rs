//! Core data models: documents and chunks on the indexing side, turns on the
//! conversation side.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Where a [`Document`] came from inside its source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    /// One page of a paginated document (PDF). Position is the 1-based page number.
    Page,
    /// One record of a tabular file (CSV). Position is the 0-based row index.
    Row,
}

/// A raw source unit: one PDF page or one CSV row.
///
/// Immutable once ingested. The `id` is derived from `source` and `position`,
/// so re-ingesting the same corpus yields the same identifiers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub id: String,
    /// Origin file path, as given to the ingestor.
    pub source: String,
    pub kind: DocumentKind,
    pub position: usize,
    pub text: String,
}

impl Document {
    pub fn new(source: impl Into<String>, kind: DocumentKind, position: usize, text: String) -> Self {
        let source = source.into();
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        hasher.update(b"#");
        hasher.update(position.to_string().as_bytes());
        let digest = format!("{:x}", hasher.finalize());

        Self {
            id: digest[..16].to_string(),
            source,
            kind,
            position,
            text,
        }
    }
}

/// A contiguous slice of a document's text, the unit of retrieval.
///
/// `start` and `end` are character (not byte) offsets into the parent
/// document's text, so `text == doc.text.chars().skip(start).take(end - start)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    pub document_id: String,
    pub source: String,
    pub position: usize,
    /// Index of this chunk within its document, contiguous from 0.
    pub index: usize,
    pub start: usize,
    pub end: usize,
    pub text: String,
}

impl Chunk {
    pub fn char_len(&self) -> usize {
        self.end - self.start
    }
}

/// Speaker of a [`Turn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message of a conversation. Turns are appended, never edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

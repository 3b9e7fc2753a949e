//! In-memory embedding index with brute-force cosine search.
//!
//! The index is built once at startup from the chunked corpus and is
//! read-only afterwards, so it can be shared across request handlers behind
//! an `Arc` without locking.
//!
//! Vectors are L2-normalised at build time; a search normalises the query
//! and ranks by dot product, which equals cosine similarity. Ties keep
//! corpus order.

use tracing::{debug, info};

use crate::embedding::{dot, normalize, EmbeddingProvider};
use crate::error::RagError;
use crate::models::Chunk;

/// A chunk returned by [`EmbeddingIndex::search`] with its similarity score.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub chunk: Chunk,
    pub score: f32,
}

/// Chunks paired with their unit-length vectors, in corpus order.
#[derive(Debug)]
pub struct EmbeddingIndex {
    chunks: Vec<Chunk>,
    vectors: Vec<Vec<f32>>,
    model: String,
    dims: usize,
}

impl EmbeddingIndex {
    /// Embed every chunk through `provider` in batches of `batch_size`.
    ///
    /// Fails with [`RagError::EmptyCorpus`] when there is nothing to index,
    /// [`RagError::Embedding`] when the provider fails, and
    /// [`RagError::DimensionMismatch`] when it returns vectors of varying
    /// length.
    pub async fn build(
        chunks: Vec<Chunk>,
        provider: &dyn EmbeddingProvider,
        batch_size: usize,
    ) -> Result<Self, RagError> {
        if chunks.is_empty() {
            return Err(RagError::EmptyCorpus);
        }

        let batch_size = batch_size.max(1);
        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(chunks.len());
        let mut dims: Option<usize> = None;

        for (batch_no, batch) in chunks.chunks(batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embedded = provider.embed(&texts).await.map_err(RagError::embedding)?;

            if embedded.len() != texts.len() {
                return Err(RagError::Embedding(format!(
                    "provider returned {} vectors for {} texts",
                    embedded.len(),
                    texts.len()
                )));
            }

            for mut vec in embedded {
                let expected = *dims.get_or_insert(vec.len());
                if vec.len() != expected {
                    return Err(RagError::DimensionMismatch {
                        expected,
                        actual: vec.len(),
                    });
                }
                normalize(&mut vec);
                vectors.push(vec);
            }

            debug!(batch = batch_no, size = batch.len(), "embedded batch");
        }

        let dims = dims.unwrap_or(0);
        info!(
            chunks = chunks.len(),
            dims,
            model = provider.model_name(),
            "embedding index built"
        );

        Ok(Self {
            chunks,
            vectors,
            model: provider.model_name().to_string(),
            dims,
        })
    }

    /// Top-`k` chunks by cosine similarity to `query`, highest first.
    ///
    /// Returns `min(k, len)` hits. Equal scores are ordered by corpus order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, RagError> {
        if query.len() != self.dims {
            return Err(RagError::DimensionMismatch {
                expected: self.dims,
                actual: query.len(),
            });
        }

        let mut query = query.to_vec();
        normalize(&mut query);

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, dot(&query, v)))
            .collect();

        // Stable sort keeps corpus order among equal scores.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| SearchHit {
                chunk: self.chunks[i].clone(),
                score,
            })
            .collect())
    }

    /// Model identifier the corpus was embedded with.
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }
}

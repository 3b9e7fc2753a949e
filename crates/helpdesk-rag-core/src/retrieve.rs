//! Query embedding plus index lookup.

use std::sync::Arc;

use tracing::debug;

use crate::embedding::{embed_one, EmbeddingProvider};
use crate::error::RagError;
use crate::index::{EmbeddingIndex, SearchHit};

/// Number of chunks retrieved per question unless configured otherwise.
pub const DEFAULT_K: usize = 6;

/// Embeds a standalone question and returns the top-k chunks.
pub struct Retriever {
    index: Arc<EmbeddingIndex>,
    provider: Arc<dyn EmbeddingProvider>,
    k: usize,
}

impl Retriever {
    /// Pair an index with the provider used for queries.
    ///
    /// Fails with [`RagError::ModelMismatch`] unless the provider is the one
    /// the index was built with.
    pub fn new(
        index: Arc<EmbeddingIndex>,
        provider: Arc<dyn EmbeddingProvider>,
        k: usize,
    ) -> Result<Self, RagError> {
        if provider.model_name() != index.model() {
            return Err(RagError::ModelMismatch {
                index: index.model().to_string(),
                query: provider.model_name().to_string(),
            });
        }
        Ok(Self { index, provider, k })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn index(&self) -> &EmbeddingIndex {
        &self.index
    }

    /// Retrieve `min(k, corpus size)` chunks, most similar first.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<SearchHit>, RagError> {
        let vector = embed_one(self.provider.as_ref(), query)
            .await
            .map_err(RagError::embedding)?;
        let hits = self.index.search(&vector, self.k)?;
        debug!(
            k = self.k,
            hits = hits.len(),
            top_score = hits.first().map(|h| h.score),
            "retrieved context"
        );
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, Document, DocumentKind};
    use async_trait::async_trait;

    /// Two-dimensional embedder: counts of "cat" and "dog".
    struct PetProvider(&'static str);

    #[async_trait]
    impl EmbeddingProvider for PetProvider {
        fn model_name(&self) -> &str {
            self.0
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    vec![
                        t.matches("cat").count() as f32 + 0.01,
                        t.matches("dog").count() as f32 + 0.01,
                    ]
                })
                .collect())
        }
    }

    fn chunks() -> Vec<Chunk> {
        ["cat cat", "dog dog", "cat dog"]
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let doc = Document::new("pets.csv", DocumentKind::Row, i, t.to_string());
                Chunk {
                    document_id: doc.id,
                    source: doc.source,
                    position: i,
                    index: 0,
                    start: 0,
                    end: t.len(),
                    text: t.to_string(),
                }
            })
            .collect()
    }

    #[tokio::test]
    async fn test_retrieve_top_k() {
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(PetProvider("pets-v1"));
        let index = EmbeddingIndex::build(chunks(), provider.as_ref(), 8)
            .await
            .unwrap();
        let retriever = Retriever::new(Arc::new(index), provider, 2).unwrap();

        let hits = retriever.retrieve("tell me about the dog").await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.text, "dog dog");
        assert_eq!(hits[1].chunk.text, "cat dog");
    }

    #[tokio::test]
    async fn test_model_mismatch_rejected() {
        let index = EmbeddingIndex::build(chunks(), &PetProvider("pets-v1"), 8)
            .await
            .unwrap();
        let err = Retriever::new(
            Arc::new(index),
            Arc::new(PetProvider("pets-v2")),
            DEFAULT_K,
        )
        .err()
        .unwrap();
        assert!(matches!(err, RagError::ModelMismatch { .. }));
    }
}

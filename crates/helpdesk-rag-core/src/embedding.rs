//! Embedding provider trait and vector utilities.
//!
//! Defines the [`EmbeddingProvider`] trait that all embedding backends
//! implement, plus pure helpers for normalisation and similarity.
//!
//! Concrete providers (OpenAI, Ollama, fastembed) live in the
//! `helpdesk-rag` app crate.

use async_trait::async_trait;

/// Trait for embedding providers.
///
/// The same provider (same model) must embed both the corpus and every
/// query; the index records [`model_name`](EmbeddingProvider::model_name)
/// and the retriever refuses a provider whose name differs.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"BAAI/bge-small-en-v1.5"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `384`).
    fn dims(&self) -> usize;
    /// Embed a batch of texts, returning one vector per input in order.
    async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Embed a single text through a batch-oriented provider.
pub async fn embed_one(provider: &dyn EmbeddingProvider, text: &str) -> anyhow::Result<Vec<f32>> {
    let mut vectors = provider.embed(&[text.to_string()]).await?;
    match vectors.pop() {
        Some(v) if vectors.is_empty() => Ok(v),
        _ => anyhow::bail!("embedding provider returned an unexpected number of vectors"),
    }
}

/// Scale a vector to unit L2 norm in place. Zero vectors are left as-is.
pub fn normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in vec.iter_mut() {
            *x /= norm;
        }
    }
}

/// Dot product of two equal-length vectors. For unit vectors this is the
/// cosine similarity.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors or vectors of
/// different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

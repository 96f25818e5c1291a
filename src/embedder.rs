//! `Embedder` capability (spec §6, consumed): `embed(text) -> [f32; D]`,
//! with `D` stable across the process lifetime. The crate ships no concrete
//! embedding model (out of scope per spec §1's Non-goals) — only the trait
//! and a null default for vector-only deployments.

use async_trait::async_trait;

use crate::error::{BrainyError, Result};

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Dimension of every vector this embedder produces. Must be constant
    /// for the lifetime of the process.
    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Returned by callers who never pass text queries — only raw vectors.
/// Rejects any call to `embed` rather than silently fabricating a vector.
pub struct NullEmbedder {
    dimension: usize,
}

impl NullEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl Embedder for NullEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(BrainyError::InvalidInput(
            "no Embedder configured: pass a vector directly instead of a text query".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_embedder_rejects_text_queries() {
        let embedder = NullEmbedder::new(128);
        assert_eq!(embedder.dimension(), 128);
        let result = embedder.embed("hello").await;
        assert!(matches!(result, Err(BrainyError::InvalidInput(_))));
    }
}

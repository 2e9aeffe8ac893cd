// Embeddings module
// Turns chunk and schema documents into vectors

pub mod ollama;

use anyhow::{Result, anyhow};

pub use ollama::{DEFAULT_EMBEDDING_DIMENSION, ModelInfo, OllamaClient};

/// Produces one vector per input text, in input order.
///
/// Implementations are blocking; async callers run them on
/// `tokio::task::spawn_blocking`.
pub trait Embedder: Send + Sync {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    #[inline]
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Embedder returned no vector"))
    }
}

impl<E: Embedder + ?Sized> Embedder for std::sync::Arc<E> {
    #[inline]
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        (**self).embed_batch(texts)
    }
}

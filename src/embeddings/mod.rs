//! Text embedding module.
//!
//! Every backend turns a piece of text into a fixed-length `f32` vector. The
//! server and the CLI only see the [`Embedder`] trait; [`build_embedder`]
//! picks the backend from configuration and wraps it with the Redis cache
//! when one is available.

pub mod cached;
pub mod hashing;
#[cfg(feature = "onnx")]
pub mod onnx;

use std::sync::Arc;

use async_trait::async_trait;
use deadpool_redis::Pool as RedisPool;

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};

pub use cached::CachedEmbedder;
pub use hashing::HashingEmbedder;
#[cfg(feature = "onnx")]
pub use onnx::OnnxEmbedder;

/// Converts text into dense vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier, used in cache keys and logs.
    fn name(&self) -> &str;

    /// Length of every vector this embedder produces.
    fn dimension(&self) -> usize;

    /// Embeds a single text.
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>>;

    /// Embeds several texts, preserving order.
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

/// Builds the configured embedder, optionally fronted by the Redis cache.
pub async fn build_embedder(
    config: &AppConfig,
    cache: Option<RedisPool>,
) -> AppResult<Arc<dyn Embedder>> {
    let backend = config.embedding_backend.to_ascii_lowercase();

    let embedder: Arc<dyn Embedder> = match backend.as_str() {
        "hashing" => Arc::new(HashingEmbedder::new(config.vector_size)),
        "onnx" => load_onnx(config).await?,
        other => {
            return Err(AppError::Internal(format!(
                "Unknown EMBEDDING_BACKEND '{other}' (expected 'onnx' or 'hashing')"
            )))
        }
    };

    if embedder.dimension() != config.vector_size {
        return Err(AppError::Internal(format!(
            "Embedder '{}' produces {} dimensions but VECTOR_SIZE is {}",
            embedder.name(),
            embedder.dimension(),
            config.vector_size
        )));
    }

    tracing::info!(
        backend = %backend,
        model = %embedder.name(),
        dimension = embedder.dimension(),
        "Embedding model ready"
    );

    Ok(match cache {
        Some(pool) => Arc::new(CachedEmbedder::new(embedder, pool, config.cache_ttl_secs)),
        None => embedder,
    })
}

#[cfg(feature = "onnx")]
async fn load_onnx(config: &AppConfig) -> AppResult<Arc<dyn Embedder>> {
    let model = OnnxEmbedder::load(
        config.embedding_model_name.clone(),
        config.embedding_model_path.clone(),
        config.embedding_tokenizer_path.clone(),
        config.embedding_max_length,
    )
    .await?;
    Ok(Arc::new(model))
}

#[cfg(not(feature = "onnx"))]
#[allow(clippy::unused_async)]
async fn load_onnx(_config: &AppConfig) -> AppResult<Arc<dyn Embedder>> {
    Err(AppError::Internal(
        "EMBEDDING_BACKEND=onnx requires building with `--features onnx`".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hashing_config() -> AppConfig {
        let mut config = AppConfig::from_env();
        config.embedding_backend = "hashing".to_string();
        config.vector_size = 64;
        config
    }

    #[tokio::test]
    async fn test_build_hashing_embedder() {
        let embedder = build_embedder(&hashing_config(), None).await.unwrap();
        assert_eq!(embedder.dimension(), 64);
        assert_eq!(embedder.embed("lexicon").await.unwrap().len(), 64);
    }

    #[tokio::test]
    async fn test_build_unknown_backend_fails() {
        let mut config = hashing_config();
        config.embedding_backend = "word2vec".to_string();
        let result = build_embedder(&config, None).await;
        assert!(matches!(result, Err(AppError::Internal(_))));
    }

    #[cfg(not(feature = "onnx"))]
    #[tokio::test]
    async fn test_build_onnx_without_feature_fails() {
        let mut config = hashing_config();
        config.embedding_backend = "onnx".to_string();
        let Err(AppError::Internal(msg)) = build_embedder(&config, None).await else {
            panic!("expected an internal error");
        };
        assert!(msg.contains("--features onnx"));
    }

    #[tokio::test]
    async fn test_default_embed_batch_preserves_order() {
        let embedder = HashingEmbedder::new(32);
        let texts = vec!["alpha".to_string(), "beta".to_string()];
        let batch = embedder.embed_batch(&texts).await.unwrap();

        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0], embedder.embed("alpha").await.unwrap());
        assert_eq!(batch[1], embedder.embed("beta").await.unwrap());
    }
}

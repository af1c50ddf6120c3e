//! Redis-backed embedding cache.
//!
//! Embeddings are pure functions of (model, text), so they are cached with a
//! long TTL. Vectors are stored as MessagePack. Any cache failure falls back to
//! the wrapped embedder.

use std::sync::Arc;

use async_trait::async_trait;
use deadpool_redis::redis::{self, AsyncCommands, RedisResult};
use deadpool_redis::Pool as RedisPool;

use crate::embeddings::Embedder;
use crate::error::{AppError, AppResult};
use crate::utils::text_digest;

pub struct CachedEmbedder {
    inner: Arc<dyn Embedder>,
    pool: RedisPool,
    ttl_secs: u64,
}

impl CachedEmbedder {
    pub fn new(inner: Arc<dyn Embedder>, pool: RedisPool, ttl_secs: u64) -> Self {
        Self {
            inner,
            pool,
            ttl_secs,
        }
    }

    fn cache_key(&self, text: &str) -> String {
        cache_key(self.inner.name(), text)
    }

    /// Decodes a cached vector; entries of the wrong size are treated as misses.
    fn decode(&self, cache_key: &str, data: &[u8]) -> Option<Vec<f32>> {
        match rmp_serde::from_slice::<Vec<f32>>(data) {
            Ok(vector) if vector.len() == self.dimension() => Some(vector),
            _ => {
                tracing::debug!(cache_key = %cache_key, "Discarding stale cache entry");
                None
            }
        }
    }
}

/// Cache key for a (model, text) pair.
pub fn cache_key(model: &str, text: &str) -> String {
    format!("embeddings:{model}:{}", text_digest(text))
}

#[async_trait]
impl Embedder for CachedEmbedder {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        let cache_key = self.cache_key(text);

        let mut conn = match self.pool.get().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(error = %e, "Embedding cache unavailable, computing directly");
                return self.inner.embed(text).await;
            }
        };

        if let Ok(Some(cached)) = conn.get::<_, Option<Vec<u8>>>(&cache_key).await {
            if let Some(vector) = self.decode(&cache_key, &cached) {
                tracing::trace!(cache_key = %cache_key, "Embedding cache hit");
                return Ok(vector);
            }
        }

        let vector = self.inner.embed(text).await?;

        match rmp_serde::to_vec(&vector) {
            Ok(data) => {
                let cache_result: Result<(), deadpool_redis::redis::RedisError> =
                    conn.set_ex(&cache_key, data, self.ttl_secs).await;

                if let Err(e) = cache_result {
                    tracing::error!(
                        cache_key = %cache_key,
                        error = %e,
                        "Failed to cache embedding"
                    );
                }
            }
            Err(e) => {
                tracing::error!(
                    cache_key = %cache_key,
                    error = %e,
                    "Failed to serialize embedding for cache"
                );
            }
        }

        Ok(vector)
    }

    /// Looks every text up with one MGET, embeds the misses in a single inner
    /// batch and writes them back in one pipeline.
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = match self.pool.get().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(error = %e, "Embedding cache unavailable, computing directly");
                return self.inner.embed_batch(texts).await;
            }
        };

        let keys: Vec<String> = texts.iter().map(|t| self.cache_key(t)).collect();
        let cached: RedisResult<Vec<Option<Vec<u8>>>> =
            redis::cmd("MGET").arg(&keys).query_async(&mut conn).await;
        let cached = cached.unwrap_or_else(|e| {
            tracing::warn!(error = %e, keys = keys.len(), "Embedding cache lookup failed");
            Vec::new()
        });

        let mut vectors: Vec<Option<Vec<f32>>> = keys
            .iter()
            .enumerate()
            .map(|(i, key)| {
                cached
                    .get(i)
                    .and_then(Option::as_deref)
                    .and_then(|data| self.decode(key, data))
            })
            .collect();

        let misses: Vec<usize> = vectors
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.is_none().then_some(i))
            .collect();

        if !misses.is_empty() {
            let miss_texts: Vec<String> = misses.iter().map(|&i| texts[i].clone()).collect();
            let computed = self.inner.embed_batch(&miss_texts).await?;
            if computed.len() != misses.len() {
                return Err(AppError::Embedding(format!(
                    "Expected {} embeddings, got {}",
                    misses.len(),
                    computed.len()
                )));
            }

            let mut pipe = redis::pipe();
            let mut queued = 0;
            for (&i, vector) in misses.iter().zip(computed) {
                match rmp_serde::to_vec(&vector) {
                    Ok(data) => {
                        pipe.set_ex(&keys[i], data, self.ttl_secs).ignore();
                        queued += 1;
                    }
                    Err(e) => tracing::error!(
                        cache_key = %keys[i],
                        error = %e,
                        "Failed to serialize embedding for cache"
                    ),
                }
                vectors[i] = Some(vector);
            }

            if queued > 0 {
                let cache_result: RedisResult<()> = pipe.query_async(&mut conn).await;
                if let Err(e) = cache_result {
                    tracing::error!(error = %e, entries = queued, "Failed to cache embeddings");
                }
            }
        }

        tracing::debug!(
            total = texts.len(),
            hits = texts.len() - misses.len(),
            misses = misses.len(),
            "Embedding batch served"
        );

        vectors
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| AppError::Embedding("Embedding batch left gaps".to_string()))
    }
}

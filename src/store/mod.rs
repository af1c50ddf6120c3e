//! Vector store module.
//!
//! Word vectors live in a single collection using cosine distance. The
//! production backend is Qdrant over its REST API; an in-process store backs
//! local development and tests.

pub mod memory;
pub mod qdrant;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::models::{CategoryTag, ScoredWord, ScrollPage, WordPoint};

pub use memory::MemoryStore;
pub use qdrant::QdrantStore;

/// Storage and nearest-neighbour search for word vectors.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Makes sure the collection exists with the given vector size.
    ///
    /// With `recreate`, any existing collection is dropped first.
    async fn ensure_collection(&self, dimension: usize, recreate: bool) -> AppResult<()>;

    /// Inserts or replaces points.
    async fn upsert(&self, points: Vec<WordPoint>) -> AppResult<()>;

    /// Returns up to `limit` points ordered by descending cosine similarity.
    async fn search(&self, vector: &[f32], limit: usize) -> AppResult<Vec<ScoredWord>>;

    /// Reads one page of points starting at `offset` (inclusive).
    async fn scroll(
        &self,
        offset: Option<String>,
        limit: usize,
        with_vectors: bool,
    ) -> AppResult<ScrollPage>;

    /// Writes the category label onto the given points.
    async fn set_category(&self, ids: &[String], tag: &CategoryTag) -> AppResult<()>;

    /// Number of points in the collection.
    async fn count(&self) -> AppResult<u64>;

    /// Returns true when the backend is reachable.
    async fn ping(&self) -> bool;
}

/// Rejects vectors whose length differs from the collection's, once known.
pub(crate) fn check_dimension(expected: Option<usize>, actual: usize) -> AppResult<()> {
    match expected {
        Some(dim) if dim != actual => Err(AppError::BadRequest(format!(
            "Vector dimension error: expected dim: {dim}, got {actual}"
        ))),
        _ => Ok(()),
    }
}

/// Builds the store selected by `VECTOR_BACKEND`.
pub fn build_store(config: &AppConfig) -> AppResult<Arc<dyn VectorStore>> {
    match config.vector_backend.to_ascii_lowercase().as_str() {
        "qdrant" => Ok(Arc::new(QdrantStore::new(
            &config.qdrant_url,
            &config.collection_name,
            &config.qdrant_api_key,
            config.qdrant_timeout_secs,
        )?)),
        "memory" => {
            tracing::warn!("Using in-memory vector store, data is lost on shutdown");
            Ok(Arc::new(MemoryStore::new()))
        }
        other => Err(AppError::Internal(format!(
            "Unknown VECTOR_BACKEND '{other}' (expected 'qdrant' or 'memory')"
        ))),
    }
}

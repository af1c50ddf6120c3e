//! Application state module.
//!
//! Contains the shared embedder, vector store and cache handles.

use std::sync::Arc;

use deadpool_redis::Pool as RedisPool;

use crate::embeddings::Embedder;
use crate::services::WordService;
use crate::store::VectorStore;

/// Shared application state.
///
/// Every field is reference counted, so cloning per request is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Vector store holding the word collection
    pub store: Arc<dyn VectorStore>,
    /// Text embedding backend
    pub embedder: Arc<dyn Embedder>,
    /// Redis pool backing the embedding cache, when enabled
    pub cache: Option<RedisPool>,
}

impl AppState {
    /// Creates a new `AppState` instance.
    #[must_use]
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        cache: Option<RedisPool>,
    ) -> Self {
        Self {
            store,
            embedder,
            cache,
        }
    }

    /// Word service over this state's embedder and store.
    pub fn words(&self) -> WordService {
        WordService::new(self.embedder.clone(), self.store.clone())
    }
}

//! HTTP request handler module.

use axum::{extract::State, http::StatusCode, Json};
use deadpool_redis::redis;

use crate::api::schemas::{AddWordResponse, SearchHit, SearchQuery, WordItem};
use crate::api::state::AppState;
use crate::error::AppResult;

/// Word indexing handler.
///
/// Embeds the word and stores it together with its meaning, synonyms,
/// antonyms and examples.
///
/// # Route
///
/// `POST /api/add_words`
pub async fn add_words_handler(
    State(state): State<AppState>,
    Json(item): Json<WordItem>,
) -> AppResult<Json<AddWordResponse>> {
    state.words().add_word(&item).await?;
    Ok(Json(AddWordResponse::added(item.word.trim())))
}

/// Semantic search handler.
///
/// Returns the stored words closest in meaning to the query word, best
/// match first.
///
/// # Route
///
/// `POST /api/search_word`
pub async fn search_word_handler(
    State(state): State<AppState>,
    Json(query): Json<SearchQuery>,
) -> AppResult<Json<Vec<SearchHit>>> {
    let hits = state.words().search_words(&query).await?;
    Ok(Json(hits))
}

/// Health check response.
#[derive(serde::Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Liveness probe handler.
///
/// Returns OK if the server is running. Used for Kubernetes liveness probe.
///
/// # Route
///
/// `GET /health`
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Readiness check response.
#[derive(serde::Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    pub vector_store: &'static str,
    pub cache: &'static str,
}

/// Readiness probe handler.
///
/// Checks vector store and cache connectivity. The cache is optional, so a
/// disabled cache does not degrade readiness; an unreachable one does.
///
/// # Route
///
/// `GET /ready`
pub async fn readiness_handler(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    let store_ok = state.store.ping().await;

    let cache = match &state.cache {
        None => None,
        Some(pool) => Some(match pool.get().await {
            Ok(mut conn) => redis::cmd("PING")
                .query_async::<String>(&mut conn)
                .await
                .is_ok(),
            Err(_) => false,
        }),
    };
    let cache_ok = cache.unwrap_or(true);

    let response = ReadinessResponse {
        status: if store_ok && cache_ok { "ok" } else { "degraded" },
        vector_store: if store_ok { "connected" } else { "disconnected" },
        cache: match cache {
            None => "disabled",
            Some(true) => "connected",
            Some(false) => "disconnected",
        },
    };

    if store_ok && cache_ok {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}

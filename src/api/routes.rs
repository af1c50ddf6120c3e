//! 라우트 설정 모듈.

use axum::{
    routing::{get, post},
    Router,
};

use crate::api::handlers::{
    add_words_handler, health_handler, readiness_handler, search_word_handler,
};
use crate::api::state::AppState;

/// Creates and configures all application routes.
///
/// # Routes
///
/// ## Health Check Routes
/// - `GET /health` - Liveness probe
/// - `GET /ready` - Readiness probe
///
/// ## API Routes
/// - `POST /api/add_words` - Embed and store a word
/// - `POST /api/search_word` - Nearest words by meaning
pub fn create_routes(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/add_words", post(add_words_handler))
        .route("/search_word", post(search_word_handler));

    // Main router
    Router::new()
        // Health check routes
        .route("/health", get(health_handler))
        .route("/ready", get(readiness_handler))
        // API routes
        .nest("/api", api_routes)
        // Shared state
        .with_state(state)
}

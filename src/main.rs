//! Semantic word search service entry point.

use std::net::SocketAddr;
use std::time::Duration;

use axum::http::{header::HeaderValue, Method};
use tokio::signal;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use lexicon_search::api::{create_routes, AppState};
use lexicon_search::config::{close_cache, init_optional_cache, init_tracing, APP_CONFIG};
use lexicon_search::embeddings::build_embedder;
use lexicon_search::store::build_store;

// High-performance memory allocator for non-MSVC targets
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Entry point for the word search service.
#[tokio::main(flavor = "multi_thread")]
async fn main() {
    // Initialize tracing
    init_tracing("lexicon_search=debug,tower_http=debug,axum=trace");

    // Initialize Sentry
    let _guard = if APP_CONFIG.sentry_dsn.is_empty() {
        tracing::warn!("Sentry DSN not configured, error tracking disabled");
        None
    } else {
        Some(sentry::init((
            APP_CONFIG.sentry_dsn.clone(),
            sentry::ClientOptions {
                release: sentry::release_name!(),
                traces_sample_rate: APP_CONFIG.sentry_traces_sample_rate,
                sample_rate: 1.0, // Capture all errors
                ..Default::default()
            },
        )))
    };

    // Initialize Redis embedding cache (optional)
    let cache = init_optional_cache().await;

    // Load embedding model
    let embedder = match build_embedder(&APP_CONFIG, cache.clone()).await {
        Ok(embedder) => embedder,
        Err(e) => {
            tracing::error!("Failed to load embedding model: {}", e);
            std::process::exit(1);
        }
    };

    // Connect vector store and prepare the collection
    let store = match build_store(&APP_CONFIG) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("Failed to configure vector store: {}", e);
            std::process::exit(1);
        }
    };

    if APP_CONFIG.recreate_collection {
        tracing::warn!(
            collection = %APP_CONFIG.collection_name,
            "RECREATE_COLLECTION is set, existing points will be dropped"
        );
    }
    if let Err(e) = store
        .ensure_collection(APP_CONFIG.vector_size, APP_CONFIG.recreate_collection)
        .await
    {
        tracing::error!("Failed to prepare collection: {}", e);
        std::process::exit(1);
    }
    tracing::info!(
        collection = %APP_CONFIG.collection_name,
        vector_size = APP_CONFIG.vector_size,
        "Collection ready"
    );

    // Create application state
    let state = AppState::new(store, embedder, cache);

    // Configure CORS based on environment
    let cors = match build_cors_layer(&APP_CONFIG.cors_origins, APP_CONFIG.is_production) {
        Ok(cors) => cors,
        Err(e) => {
            tracing::error!("Invalid CORS configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Configure rate limiting with SmartIpKeyExtractor for better IP detection
    let governor_config = GovernorConfigBuilder::default()
        .per_second(APP_CONFIG.rate_limit_per_second)
        .burst_size(APP_CONFIG.rate_limit_burst_size)
        .key_extractor(SmartIpKeyExtractor)
        .finish()
        .expect("Failed to build rate limiter config");

    // Create router with middleware
    // Layer order (bottom to top execution): CORS -> Compression -> Trace -> Rate Limit
    let app = create_routes(state)
        .layer(cors)
        .layer(
            CompressionLayer::new()
                .br(true)
                .gzip(true)
                .zstd(true)
                .quality(tower_http::compression::CompressionLevel::Default),
        )
        .layer(TraceLayer::new_for_http())
        .layer(GovernorLayer::new(governor_config));

    // Determine server address
    let port: u16 = APP_CONFIG.server_port.parse().unwrap_or(8002);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(
        port = port,
        rate_limit_per_second = APP_CONFIG.rate_limit_per_second,
        rate_limit_burst = APP_CONFIG.rate_limit_burst_size,
        "Starting server"
    );

    // Create TCP listener
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    // Run server with graceful shutdown and ConnectInfo for rate limiting
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Failed to start server");

    // Cleanup
    tracing::info!("Shutting down...");

    close_cache();

    // Flush Sentry events before exit
    if let Some(client) = sentry::Hub::current().client() {
        client.flush(Some(Duration::from_secs(2)));
    }

    tracing::info!("Shutdown complete");
}

/// Builds the CORS layer based on configuration.
///
/// Production refuses to start with every origin allowed, whether from `*`
/// or from a list with no parseable origin.
fn build_cors_layer(cors_origins: &str, is_production: bool) -> Result<CorsLayer, String> {
    let allow_any = || {
        CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_origin(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any)
    };

    if cors_origins.trim() == "*" {
        if is_production {
            return Err("CORS_ORIGINS=* is not allowed in production".to_string());
        }
        tracing::warn!("CORS is configured to allow all origins - not recommended for production");
        return Ok(allow_any());
    }

    let origins: Vec<HeaderValue> = cors_origins
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect();

    if origins.is_empty() {
        if is_production {
            return Err(format!("No valid CORS origins in '{cors_origins}'"));
        }
        tracing::warn!("No valid CORS origins configured, allowing all");
        Ok(allow_any())
    } else {
        tracing::info!(origins = ?origins, "CORS configured with specific origins");
        Ok(CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_origin(origins)
            .allow_headers(tower_http::cors::Any))
    }
}

/// Handles shutdown signals for graceful termination.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        },
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cors_wildcard_allowed_outside_production() {
        assert!(build_cors_layer("*", false).is_ok());
        assert!(build_cors_layer("", false).is_ok());
    }

    #[test]
    fn test_cors_wildcard_rejected_in_production() {
        assert!(build_cors_layer("*", true).is_err());
        assert!(build_cors_layer(" , ", true).is_err());
    }

    #[test]
    fn test_cors_explicit_origins_in_production() {
        assert!(build_cors_layer("https://lexicon.example.com, https://admin.example.com", true).is_ok());
    }
}

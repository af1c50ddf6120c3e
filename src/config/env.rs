//! Environment variable configuration module.
//!
//! Provides environment variable loading and the global `APP_CONFIG` instance.

use std::env;
use std::sync::Once;

use once_cell::sync::Lazy;

static INIT: Once = Once::new();

/// Initializes the environment by loading the .env file.
/// This is called automatically when `get_env` is first used.
fn init_env() {
    INIT.call_once(|| {
        if let Err(e) = dotenvy::dotenv() {
            tracing::warn!("Warning: .env file not found or error loading: {}", e);
        }
    });
}

/// Retrieves an environment variable by key.
///
/// If the variable is not set, returns the provided default value.
/// If no default is provided and the variable is not set, returns an empty string.
pub fn get_env(key: &str, default: Option<&str>) -> String {
    init_env();
    env::var(key).unwrap_or_else(|_| default.unwrap_or("").to_string())
}

/// Retrieves an environment variable as a parsed type.
pub fn get_env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    init_env();
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses a boolean flag, accepting `true`/`1`/`yes` (case-insensitive).
fn get_env_flag(key: &str, default: bool) -> bool {
    let raw = get_env(key, Some(if default { "true" } else { "false" }));
    matches!(raw.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    // Server settings
    pub server_port: String,

    // Environment
    pub is_production: bool,

    // Sentry settings
    pub sentry_dsn: String,
    pub sentry_traces_sample_rate: f32,

    // Logging
    pub log_format: String,
    pub log_file: String,

    // Cache settings
    pub cache_enabled: bool,
    pub cache_ttl_secs: u64,
    pub redis_max_connections: usize,

    // CORS settings
    pub cors_origins: String,

    // Rate limiting
    pub rate_limit_per_second: u64,
    pub rate_limit_burst_size: u32,

    // Vector store
    pub vector_backend: String,
    pub qdrant_url: String,
    pub qdrant_api_key: String,
    pub qdrant_timeout_secs: u64,
    pub collection_name: String,
    pub vector_size: usize,
    pub recreate_collection: bool,

    // Embeddings
    pub embedding_backend: String,
    pub embedding_model_name: String,
    pub embedding_model_path: String,
    pub embedding_tokenizer_path: String,
    pub embedding_max_length: usize,

    // LLM used for naming word clusters
    pub llm_api_url: String,
    pub llm_api_key: String,
    pub llm_model: String,
    pub llm_timeout_secs: u64,
    pub llm_max_retries: u32,
    pub llm_retry_delay_secs: u64,
}

impl AppConfig {
    /// Creates a new `AppConfig` from environment variables.
    pub fn from_env() -> Self {
        let rust_env = get_env("RUST_ENV", Some("development"));
        let is_production = rust_env == "production" || rust_env == "prod";

        let default_embedding_backend = if cfg!(feature = "onnx") {
            "onnx"
        } else {
            "hashing"
        };

        Self {
            server_port: get_env("SERVER_PORT", Some("8002")),

            is_production,

            sentry_dsn: get_env("SENTRY_DSN", None),
            sentry_traces_sample_rate: get_env_parsed("SENTRY_TRACES_SAMPLE_RATE", 0.1),

            log_format: get_env("LOG_FORMAT", Some("pretty")),
            log_file: get_env("LOG_FILE", None),

            cache_enabled: get_env_flag("CACHE_ENABLED", true),
            cache_ttl_secs: get_env_parsed("CACHE_TTL_SECS", 86_400),
            redis_max_connections: get_env_parsed("REDIS_MAX_CONNECTIONS", 20),

            cors_origins: get_env("CORS_ORIGINS", Some("*")),

            rate_limit_per_second: get_env_parsed("RATE_LIMIT_PER_SECOND", 10),
            rate_limit_burst_size: get_env_parsed("RATE_LIMIT_BURST_SIZE", 50),

            vector_backend: get_env("VECTOR_BACKEND", Some("qdrant")),
            qdrant_url: get_env("QDRANT_URL", Some("http://localhost:6333")),
            qdrant_api_key: get_env("QDRANT_API_KEY", None),
            qdrant_timeout_secs: get_env_parsed("QDRANT_TIMEOUT_SECS", 30),
            collection_name: get_env("COLLECTION_NAME", Some("words")),
            vector_size: get_env_parsed("VECTOR_SIZE", 384),
            recreate_collection: get_env_flag("RECREATE_COLLECTION", false),

            embedding_backend: get_env("EMBEDDING_BACKEND", Some(default_embedding_backend)),
            embedding_model_name: get_env("EMBEDDING_MODEL_NAME", Some("BAAI/bge-small-en-v1.5")),
            embedding_model_path: get_env(
                "EMBEDDING_MODEL_PATH",
                Some("models/bge-small-en-v1.5/model.onnx"),
            ),
            embedding_tokenizer_path: get_env(
                "EMBEDDING_TOKENIZER_PATH",
                Some("models/bge-small-en-v1.5/tokenizer.json"),
            ),
            embedding_max_length: get_env_parsed("EMBEDDING_MAX_LENGTH", 512),

            llm_api_url: get_env(
                "LLM_API_URL",
                Some("https://api.avalai.ir/v1/chat/completions"),
            ),
            llm_api_key: get_env("AVALAI_API_KEY", None),
            llm_model: get_env("LLM_MODEL", Some("gpt-4o-mini")),
            llm_timeout_secs: get_env_parsed("LLM_TIMEOUT_SECS", 30),
            llm_max_retries: get_env_parsed("LLM_MAX_RETRIES", 3),
            llm_retry_delay_secs: get_env_parsed("LLM_RETRY_DELAY_SECS", 2),
        }
    }
}

/// Global application configuration instance.
pub static APP_CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

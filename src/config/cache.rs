//! Redis cache configuration module.

use crate::config::env::{get_env, APP_CONFIG};
use crate::error::{AppError, AppResult};
use deadpool_redis::{Config, Pool, PoolConfig, Runtime};
use once_cell::sync::OnceCell;

static CACHE_POOL: OnceCell<Pool> = OnceCell::new();

/// Builds the Redis connection URL from `REDIS_HOST`, `REDIS_PORT` and `REDIS_PASSWORD`.
fn redis_url() -> String {
    let host = get_env("REDIS_HOST", Some("localhost"));
    let port = get_env("REDIS_PORT", Some("6379"));
    let password = get_env("REDIS_PASSWORD", None);

    if password.is_empty() {
        format!("redis://{host}:{port}")
    } else {
        format!("redis://:{password}@{host}:{port}")
    }
}

/// Initializes the Redis connection pool.
///
/// This function creates a connection pool and stores it in a global `OnceCell`.
/// Subsequent calls will return a clone of the same pool.
///
/// # Errors
///
/// Returns an error if the Redis connection cannot be established
pub async fn init_cache() -> AppResult<Pool> {
    if let Some(pool) = CACHE_POOL.get() {
        return Ok(pool.clone());
    }

    let mut cfg = Config::from_url(redis_url());
    cfg.pool = Some(PoolConfig {
        max_size: APP_CONFIG.redis_max_connections,
        ..PoolConfig::default()
    });

    let pool = cfg
        .create_pool(Some(Runtime::Tokio1))
        .map_err(|e| AppError::Internal(format!("Redis pool error: {e}")))?;

    // Test connection
    let conn = pool
        .get()
        .await
        .map_err(|e| AppError::Internal(format!("Redis connection test failed: {e}")))?;
    drop(conn);

    CACHE_POOL.set(pool.clone()).ok();
    tracing::info!(
        max_connections = APP_CONFIG.redis_max_connections,
        "Redis connection pool established"
    );

    Ok(pool)
}

/// Initializes the cache only when `CACHE_ENABLED` is set.
///
/// The embedding cache is an accelerator: a failed connection is logged and
/// the service keeps running without it.
pub async fn init_optional_cache() -> Option<Pool> {
    if !APP_CONFIG.cache_enabled {
        tracing::info!("Embedding cache disabled");
        return None;
    }

    match init_cache().await {
        Ok(pool) => Some(pool),
        Err(e) => {
            tracing::warn!(error = %e, "Redis unavailable, continuing without embedding cache");
            None
        }
    }
}

/// Closes the Redis connection pool.
///
/// Note: The pool handles cleanup automatically when dropped.
pub fn close_cache() {
    if CACHE_POOL.get().is_some() {
        tracing::info!("Redis connection pool closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redis_url_has_scheme() {
        assert!(redis_url().starts_with("redis://"));
    }
}

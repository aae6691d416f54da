//! Repository backend selection for the refresh token store.
//!
//! This crate centralizes URL-based backend selection and wraps the chosen
//! implementation with `ObservedRepository` for tracing.

use std::sync::Arc;

use token_store_core::TokenStoreError;

pub use token_store_observability::ObservedRepository;
pub use token_store_ports::{DynRefreshTokenRepository, RefreshTokenRepository};

pub mod sqlx {
    pub use token_store_sqlx::{SqlxRefreshTokenStore, DEFAULT_GENERATION_ATTEMPTS};
}

/// Connection settings for [`create_repository_with`].
#[derive(Debug, Clone)]
pub struct RepositoryOptions {
    pub max_connections: u32,
    pub generation_attempts: u32,
}

impl Default for RepositoryOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            generation_attempts: token_store_sqlx::DEFAULT_GENERATION_ATTEMPTS,
        }
    }
}

/// Create a repository based on URL scheme, with default options.
///
/// Supported:
/// - `postgres://...` / `postgresql://...` -> SQLx (Postgres)
/// - `sqlite:...` -> SQLx (SQLite)
pub async fn create_repository(
    database_url: &str,
) -> Result<DynRefreshTokenRepository, TokenStoreError> {
    create_repository_with(database_url, &RepositoryOptions::default()).await
}

pub async fn create_repository_with(
    database_url: &str,
    options: &RepositoryOptions,
) -> Result<DynRefreshTokenRepository, TokenStoreError> {
    let supported = database_url.starts_with("postgres://")
        || database_url.starts_with("postgresql://")
        || database_url.starts_with("sqlite:");
    if !supported {
        let scheme = database_url.split(':').next().unwrap_or_default();
        return Err(TokenStoreError::Storage(format!(
            "unsupported database URL scheme `{scheme}` (expected postgres:// or sqlite:)"
        )));
    }

    let store =
        token_store_sqlx::SqlxRefreshTokenStore::connect(database_url, options.max_connections)
            .await?
            .with_generation_attempts(options.generation_attempts);
    let db_system = store.db_system();

    let inner: DynRefreshTokenRepository = Arc::new(store);
    let observed = ObservedRepository::new(inner, db_system.to_string());
    Ok(Arc::new(observed))
}

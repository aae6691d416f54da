use async_trait::async_trait;
use std::sync::Arc;

use token_store_core::{NewRefreshToken, RefreshToken, TokenStoreError};

/// Trait implemented by all refresh token backends.
///
/// Implementations hold no mutable in-process state. Uniqueness of `token`
/// must be enforced by the store itself, and every write must be atomic.
/// Implementations must not log or notify; callers compose that.
#[async_trait]
pub trait RefreshTokenRepository: Send + Sync {
    /// Initialize the backing store (e.g., bootstrap schema).
    async fn init(&self) -> Result<(), TokenStoreError>;

    /// Persist a new token and return the stored record.
    ///
    /// Without a supplied token one is generated, retrying on collision up to
    /// the backend's bound before failing with `ExhaustedRetries`. A supplied
    /// token that already exists fails with `Conflict`.
    async fn create(&self, candidate: &NewRefreshToken) -> Result<RefreshToken, TokenStoreError>;

    async fn get_by_token(&self, token: &str) -> Result<Option<RefreshToken>, TokenStoreError>;

    /// Every live token, oldest first.
    async fn list_all(&self) -> Result<Vec<RefreshToken>, TokenStoreError>;

    async fn list_by_client(
        &self,
        client_uuid: &str,
    ) -> Result<Vec<RefreshToken>, TokenStoreError>;

    async fn list_by_account(
        &self,
        account_uuid: &str,
    ) -> Result<Vec<RefreshToken>, TokenStoreError>;

    /// Remove a token. Removing an absent token succeeds.
    async fn delete(&self, token: &str) -> Result<(), TokenStoreError>;

    /// Remove a token and return the record that was removed.
    ///
    /// Of several concurrent calls for one token, exactly one sees `Some`.
    async fn remove(&self, token: &str) -> Result<Option<RefreshToken>, TokenStoreError>;

    /// Remove every token of an account, returning how many were removed.
    async fn delete_by_account(&self, account_uuid: &str) -> Result<u64, TokenStoreError>;

    /// Replace `old_token` with a new token in one transaction.
    ///
    /// Returns `None`, issuing nothing, when `old_token` no longer exists.
    async fn rotate(
        &self,
        old_token: &str,
        replacement: &NewRefreshToken,
    ) -> Result<Option<RefreshToken>, TokenStoreError>;

    /// Lightweight liveness/readiness check.
    ///
    /// Implementations may override to do something cheaper than `init()`.
    async fn healthcheck(&self) -> Result<(), TokenStoreError> {
        self.init().await
    }
}

pub type DynRefreshTokenRepository = Arc<dyn RefreshTokenRepository>;

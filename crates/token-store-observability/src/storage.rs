use async_trait::async_trait;
use tracing::{field, Instrument};

use token_store_core::{token_prefix, NewRefreshToken, RefreshToken, TokenStoreError};
use token_store_ports::{DynRefreshTokenRepository, RefreshTokenRepository};

/// A thin wrapper around a `DynRefreshTokenRepository` that creates a tracing
/// span for each repository call.
///
/// Spans only ever carry a token prefix and length, never the full bearer value.
pub struct ObservedRepository {
    inner: DynRefreshTokenRepository,
    db_system: String,
}

impl ObservedRepository {
    pub fn new(inner: DynRefreshTokenRepository, db_system: String) -> Self {
        Self { inner, db_system }
    }

    fn span(&self, operation: &'static str) -> tracing::Span {
        tracing::info_span!(
            "db",
            db_system = %self.db_system,
            db_operation = operation,
            outcome = field::Empty
        )
    }

    fn token_span(&self, operation: &'static str, token: &str) -> tracing::Span {
        tracing::info_span!(
            "db",
            db_system = %self.db_system,
            db_operation = operation,
            token_prefix = %token_prefix(token),
            token_len = token.len(),
            outcome = field::Empty
        )
    }
}

fn record_outcome<T>(result: &Result<T, TokenStoreError>) {
    let span = tracing::Span::current();
    match result {
        Ok(_) => {
            span.record("outcome", "ok");
        }
        Err(e) => {
            span.record("outcome", "error");
            if e.is_client_error() {
                tracing::debug!(error = %e, "refresh token operation rejected");
            } else {
                tracing::warn!(error = %e, "refresh token operation failed");
            }
        }
    }
}

#[async_trait]
impl RefreshTokenRepository for ObservedRepository {
    async fn init(&self) -> Result<(), TokenStoreError> {
        let span = self.span("init");
        async move {
            let result = self.inner.init().await;
            record_outcome(&result);
            result
        }
        .instrument(span)
        .await
    }

    async fn create(&self, candidate: &NewRefreshToken) -> Result<RefreshToken, TokenStoreError> {
        let span = tracing::info_span!(
            "db",
            db_system = %self.db_system,
            db_operation = "create",
            client_uuid = %candidate.client_uuid,
            account_uuid = %candidate.account_uuid,
            scope = %candidate.scope,
            token_supplied = candidate.supplied_token().is_some(),
            token_prefix = field::Empty,
            outcome = field::Empty
        );
        async move {
            let result = self.inner.create(candidate).await;
            if let Ok(stored) = &result {
                tracing::Span::current().record("token_prefix", stored.prefix().as_str());
            }
            record_outcome(&result);
            result
        }
        .instrument(span)
        .await
    }

    async fn get_by_token(&self, token: &str) -> Result<Option<RefreshToken>, TokenStoreError> {
        let span = self.token_span("get_by_token", token);
        async move {
            let result = self.inner.get_by_token(token).await;
            record_outcome(&result);
            result
        }
        .instrument(span)
        .await
    }

    async fn list_all(&self) -> Result<Vec<RefreshToken>, TokenStoreError> {
        let span = self.span("list_all");
        async move {
            let result = self.inner.list_all().await;
            record_outcome(&result);
            result
        }
        .instrument(span)
        .await
    }

    async fn list_by_client(
        &self,
        client_uuid: &str,
    ) -> Result<Vec<RefreshToken>, TokenStoreError> {
        let span = tracing::info_span!(
            "db",
            db_system = %self.db_system,
            db_operation = "list_by_client",
            client_uuid = %client_uuid,
            outcome = field::Empty
        );
        async move {
            let result = self.inner.list_by_client(client_uuid).await;
            record_outcome(&result);
            result
        }
        .instrument(span)
        .await
    }

    async fn list_by_account(
        &self,
        account_uuid: &str,
    ) -> Result<Vec<RefreshToken>, TokenStoreError> {
        let span = tracing::info_span!(
            "db",
            db_system = %self.db_system,
            db_operation = "list_by_account",
            account_uuid = %account_uuid,
            outcome = field::Empty
        );
        async move {
            let result = self.inner.list_by_account(account_uuid).await;
            record_outcome(&result);
            result
        }
        .instrument(span)
        .await
    }

    async fn delete(&self, token: &str) -> Result<(), TokenStoreError> {
        let span = self.token_span("delete", token);
        async move {
            let result = self.inner.delete(token).await;
            record_outcome(&result);
            result
        }
        .instrument(span)
        .await
    }

    async fn remove(&self, token: &str) -> Result<Option<RefreshToken>, TokenStoreError> {
        let span = self.token_span("remove", token);
        async move {
            let result = self.inner.remove(token).await;
            record_outcome(&result);
            result
        }
        .instrument(span)
        .await
    }

    async fn delete_by_account(&self, account_uuid: &str) -> Result<u64, TokenStoreError> {
        let span = tracing::info_span!(
            "db",
            db_system = %self.db_system,
            db_operation = "delete_by_account",
            account_uuid = %account_uuid,
            outcome = field::Empty
        );
        async move {
            let result = self.inner.delete_by_account(account_uuid).await;
            record_outcome(&result);
            result
        }
        .instrument(span)
        .await
    }

    async fn rotate(
        &self,
        old_token: &str,
        replacement: &NewRefreshToken,
    ) -> Result<Option<RefreshToken>, TokenStoreError> {
        let span = self.token_span("rotate", old_token);
        async move {
            let result = self.inner.rotate(old_token, replacement).await;
            record_outcome(&result);
            result
        }
        .instrument(span)
        .await
    }

    async fn healthcheck(&self) -> Result<(), TokenStoreError> {
        let span = self.span("healthcheck");
        async move {
            let result = self.inner.healthcheck().await;
            record_outcome(&result);
            result
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::{Arc, Mutex};
    use token_store_core::ScopeSet;

    /// Records calls so delegation can be checked without a database.
    #[derive(Default)]
    struct Recording {
        calls: Mutex<Vec<String>>,
    }

    impl Recording {
        fn record(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }
    }

    fn stored(candidate: &NewRefreshToken) -> RefreshToken {
        let now = Utc::now();
        RefreshToken {
            token: candidate
                .supplied_token()
                .unwrap_or("generated")
                .to_string(),
            scope: candidate.scope.clone(),
            client_uuid: candidate.client_uuid.clone(),
            account_uuid: candidate.account_uuid.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    #[async_trait]
    impl RefreshTokenRepository for Recording {
        async fn init(&self) -> Result<(), TokenStoreError> {
            self.record("init");
            Ok(())
        }
        async fn create(
            &self,
            candidate: &NewRefreshToken,
        ) -> Result<RefreshToken, TokenStoreError> {
            self.record("create");
            Ok(stored(candidate))
        }
        async fn get_by_token(
            &self,
            token: &str,
        ) -> Result<Option<RefreshToken>, TokenStoreError> {
            self.record(format!("get_by_token:{token}"));
            Ok(None)
        }
        async fn list_all(&self) -> Result<Vec<RefreshToken>, TokenStoreError> {
            self.record("list_all");
            Ok(vec![])
        }
        async fn list_by_client(&self, c: &str) -> Result<Vec<RefreshToken>, TokenStoreError> {
            self.record(format!("list_by_client:{c}"));
            Ok(vec![])
        }
        async fn list_by_account(&self, a: &str) -> Result<Vec<RefreshToken>, TokenStoreError> {
            self.record(format!("list_by_account:{a}"));
            Ok(vec![])
        }
        async fn delete(&self, token: &str) -> Result<(), TokenStoreError> {
            self.record(format!("delete:{token}"));
            Err(TokenStoreError::Storage("disk full".into()))
        }
        async fn remove(&self, token: &str) -> Result<Option<RefreshToken>, TokenStoreError> {
            self.record(format!("remove:{token}"));
            Ok(None)
        }
        async fn delete_by_account(&self, a: &str) -> Result<u64, TokenStoreError> {
            self.record(format!("delete_by_account:{a}"));
            Ok(2)
        }
        async fn rotate(
            &self,
            old: &str,
            replacement: &NewRefreshToken,
        ) -> Result<Option<RefreshToken>, TokenStoreError> {
            self.record(format!("rotate:{old}"));
            Ok(Some(stored(replacement)))
        }
    }

    #[tokio::test]
    async fn delegates_every_call_and_preserves_results() {
        let inner = Arc::new(Recording::default());
        let observed = ObservedRepository::new(inner.clone(), "test".to_string());
        let candidate = NewRefreshToken::new(
            "c1".into(),
            "a1".into(),
            ScopeSet::parse("read").unwrap(),
        );

        observed.init().await.unwrap();
        let created = observed.create(&candidate).await.unwrap();
        assert_eq!(created.token, "generated");
        assert_eq!(observed.get_by_token("abc").await.unwrap(), None);
        assert!(observed.list_all().await.unwrap().is_empty());
        assert!(observed.list_by_client("c1").await.unwrap().is_empty());
        assert!(observed.list_by_account("a1").await.unwrap().is_empty());
        assert_eq!(
            observed.delete("abc").await.unwrap_err(),
            TokenStoreError::Storage("disk full".into())
        );
        assert_eq!(observed.remove("abc").await.unwrap(), None);
        assert_eq!(observed.delete_by_account("a1").await.unwrap(), 2);
        assert!(observed.rotate("abc", &candidate).await.unwrap().is_some());
        // Default healthcheck falls through to init.
        observed.healthcheck().await.unwrap();

        let calls = inner.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                "init",
                "create",
                "get_by_token:abc",
                "list_all",
                "list_by_client:c1",
                "list_by_account:a1",
                "delete:abc",
                "remove:abc",
                "delete_by_account:a1",
                "rotate:abc",
                "init",
            ]
        );
    }
}

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use token_store_core::{NewRefreshToken, RefreshToken, ScopeSet, TokenStoreError};
use token_store_mail::{EmailDispatcher, MailError, MailTemplates};
use token_store_ports::{cancellable, DynRefreshTokenRepository, OperationContext};

/// Template used for revocation notices.
pub const REVOCATION_TEMPLATE: &str = "revocation_notice.txt";

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Store(#[from] TokenStoreError),
    #[error(transparent)]
    Mail(#[from] MailError),
}

#[derive(Serialize)]
struct RevocationNotice<'a> {
    from: &'a str,
    to: &'a str,
    client_uuid: &'a str,
    token_prefix: String,
    revoked_at: String,
}

/// Renders and sends revocation notices.
pub struct RevocationNotifier {
    dispatcher: Arc<dyn EmailDispatcher>,
    templates: Arc<MailTemplates>,
    from: String,
}

impl RevocationNotifier {
    pub fn new(
        dispatcher: Arc<dyn EmailDispatcher>,
        templates: Arc<MailTemplates>,
        from: String,
    ) -> Self {
        Self {
            dispatcher,
            templates,
            from,
        }
    }

    /// Render first, then send. Render failures are configuration errors and
    /// are returned as-is; transport failures are returned too and left to the
    /// caller to treat as best-effort.
    pub async fn notify(&self, revoked: &RefreshToken, recipient: &str) -> Result<(), MailError> {
        let notice = RevocationNotice {
            from: &self.from,
            to: recipient,
            client_uuid: &revoked.client_uuid,
            token_prefix: revoked.prefix(),
            revoked_at: Utc::now().to_rfc2822(),
        };
        let message = self.templates.render(REVOCATION_TEMPLATE, &notice)?;

        self.dispatcher
            .send(&[recipient.to_string()], &message)
            .await
    }
}

/// Token lifecycle operations as used by grant handlers and maintenance tools.
///
/// Composes the repository with logging and optional notifications; the
/// repository itself stays free of side effects.
pub struct TokenService {
    repo: DynRefreshTokenRepository,
    notifier: Option<RevocationNotifier>,
}

impl TokenService {
    pub fn new(repo: DynRefreshTokenRepository) -> Self {
        Self {
            repo,
            notifier: None,
        }
    }

    pub fn with_notifier(repo: DynRefreshTokenRepository, notifier: RevocationNotifier) -> Self {
        Self {
            repo,
            notifier: Some(notifier),
        }
    }

    pub fn repository(&self) -> &DynRefreshTokenRepository {
        &self.repo
    }

    /// Issue a new refresh token with a generated value.
    pub async fn issue(
        &self,
        ctx: &OperationContext,
        client_uuid: &str,
        account_uuid: &str,
        scope: ScopeSet,
    ) -> Result<RefreshToken, ServiceError> {
        let candidate =
            NewRefreshToken::new(client_uuid.to_string(), account_uuid.to_string(), scope);
        let issued = cancellable(ctx, self.repo.create(&candidate)).await?;

        tracing::info!(
            token_prefix = %issued.prefix(),
            client_uuid = %issued.client_uuid,
            account_uuid = %issued.account_uuid,
            scope = %issued.scope,
            "refresh token issued"
        );
        Ok(issued)
    }

    pub async fn lookup(
        &self,
        ctx: &OperationContext,
        token: &str,
    ) -> Result<Option<RefreshToken>, ServiceError> {
        Ok(cancellable(ctx, self.repo.get_by_token(token)).await?)
    }

    /// Exchange a presented refresh token for a new one with the same grant.
    ///
    /// `None` when the token is unknown or was rotated concurrently; the
    /// caller should answer `invalid_grant`. A presented token that is not
    /// owned by `client_uuid` is treated as unknown and left untouched.
    pub async fn refresh(
        &self,
        ctx: &OperationContext,
        token: &str,
        client_uuid: &str,
    ) -> Result<Option<RefreshToken>, ServiceError> {
        let Some(existing) = cancellable(ctx, self.repo.get_by_token(token)).await? else {
            return Ok(None);
        };
        if existing.client_uuid != client_uuid {
            tracing::warn!(
                token_prefix = %existing.prefix(),
                presented_by = %client_uuid,
                "refresh token presented by a different client"
            );
            return Ok(None);
        }

        let replacement = NewRefreshToken::replacing(&existing);
        let rotated = cancellable(ctx, self.repo.rotate(token, &replacement)).await?;

        match &rotated {
            Some(new_token) => tracing::info!(
                old_token_prefix = %existing.prefix(),
                token_prefix = %new_token.prefix(),
                client_uuid = %new_token.client_uuid,
                "refresh token rotated"
            ),
            None => tracing::warn!(
                token_prefix = %existing.prefix(),
                "refresh token was rotated or revoked concurrently"
            ),
        }
        Ok(rotated)
    }

    pub async fn list(&self, ctx: &OperationContext) -> Result<Vec<RefreshToken>, ServiceError> {
        Ok(cancellable(ctx, self.repo.list_all()).await?)
    }

    pub async fn list_by_client(
        &self,
        ctx: &OperationContext,
        client_uuid: &str,
    ) -> Result<Vec<RefreshToken>, ServiceError> {
        Ok(cancellable(ctx, self.repo.list_by_client(client_uuid)).await?)
    }

    pub async fn list_by_account(
        &self,
        ctx: &OperationContext,
        account_uuid: &str,
    ) -> Result<Vec<RefreshToken>, ServiceError> {
        Ok(cancellable(ctx, self.repo.list_by_account(account_uuid)).await?)
    }

    /// Revoke a token, optionally mailing a notice to `notify`.
    ///
    /// Returns the revoked record, or `None` if it did not exist (nothing is
    /// sent then). Only the call whose delete removed the row gets the record,
    /// so concurrent revokes of one token send at most one notice. The token
    /// is deleted before any mail is rendered, so a mail problem never keeps a
    /// token alive. Template errors are returned; delivery errors are logged
    /// and otherwise ignored.
    pub async fn revoke(
        &self,
        ctx: &OperationContext,
        token: &str,
        notify: Option<&str>,
    ) -> Result<Option<RefreshToken>, ServiceError> {
        let Some(existing) = cancellable(ctx, self.repo.remove(token)).await? else {
            return Ok(None);
        };

        tracing::info!(
            token_prefix = %existing.prefix(),
            client_uuid = %existing.client_uuid,
            account_uuid = %existing.account_uuid,
            "refresh token revoked"
        );

        if let (Some(recipient), Some(notifier)) = (notify, &self.notifier) {
            match notifier.notify(&existing, recipient).await {
                Ok(()) => {}
                Err(e) if e.is_configuration_error() => return Err(e.into()),
                Err(e) => tracing::warn!(
                    error = %e,
                    token_prefix = %existing.prefix(),
                    "revocation notice could not be delivered"
                ),
            }
        }

        Ok(Some(existing))
    }

    /// Revoke every token of an account (logout everywhere).
    pub async fn revoke_account(
        &self,
        ctx: &OperationContext,
        account_uuid: &str,
    ) -> Result<u64, ServiceError> {
        let removed = cancellable(ctx, self.repo.delete_by_account(account_uuid)).await?;
        tracing::info!(account_uuid = %account_uuid, removed, "account refresh tokens revoked");
        Ok(removed)
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ScopeSet;

/// An OAuth refresh token issued in a `code` grant.
///
/// `token` is both the primary key and the bearer secret. Timestamps are
/// assigned by the repository on write and never taken from callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshToken {
    pub token: String,
    pub scope: ScopeSet,
    pub client_uuid: String,
    pub account_uuid: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RefreshToken {
    /// First characters of the token, safe to put in logs and spans.
    pub fn prefix(&self) -> String {
        token_prefix(&self.token)
    }
}

/// Candidate passed to `create`.
///
/// Leave `token` unset to have one generated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRefreshToken {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub scope: ScopeSet,
    pub client_uuid: String,
    pub account_uuid: String,
}

impl NewRefreshToken {
    pub fn new(client_uuid: String, account_uuid: String, scope: ScopeSet) -> Self {
        Self {
            token: None,
            scope,
            client_uuid,
            account_uuid,
        }
    }

    /// Use a caller-chosen token value (migrations, tests).
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// The explicitly supplied token, treating an empty string as absent.
    pub fn supplied_token(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.is_empty())
    }

    /// Candidate for the same grant, used when rotating `token`.
    pub fn replacing(token: &RefreshToken) -> Self {
        Self::new(
            token.client_uuid.clone(),
            token.account_uuid.clone(),
            token.scope.clone(),
        )
    }
}

/// Never log full tokens.
pub fn token_prefix(token: &str) -> String {
    token.chars().take(12).collect::<String>()
}

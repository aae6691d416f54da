use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure kinds of the token store.
///
/// A lookup miss is not an error: lookups return `Ok(None)`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenStoreError {
    /// The supplied token value is already in use.
    #[error("refresh token already exists: {0}")]
    Conflict(String),

    /// The referenced client or account does not exist.
    #[error("dangling reference: {0}")]
    Reference(String),

    /// Every generated token collided with an existing one.
    #[error("no free token found after {attempts} attempts")]
    ExhaustedRetries { attempts: u32 },

    /// The caller cancelled the operation or its deadline passed.
    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid scope: {0}")]
    InvalidScope(String),

    /// The OS random source failed. Not recoverable.
    #[error("secure random source unavailable: {0}")]
    EntropyUnavailable(String),

    /// Any other backing store failure.
    #[error("storage error: {0}")]
    Storage(String),
}

impl TokenStoreError {
    /// Whether an HTTP layer should answer with a 4xx.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            TokenStoreError::Conflict(_)
                | TokenStoreError::Reference(_)
                | TokenStoreError::InvalidScope(_)
        )
    }

    pub fn status_code(&self) -> u16 {
        match self {
            TokenStoreError::Conflict(_) => 409,
            TokenStoreError::Reference(_) => 422,
            TokenStoreError::InvalidScope(_) => 400,
            TokenStoreError::Cancelled => 503,
            TokenStoreError::ExhaustedRetries { .. }
            | TokenStoreError::EntropyUnavailable(_)
            | TokenStoreError::Storage(_) => 500,
        }
    }
}

#[cfg(feature = "sqlx")]
impl From<sqlx::Error> for TokenStoreError {
    fn from(err: sqlx::Error) -> Self {
        // Provide a stable, non-leaky mapping for common constraint violations.
        if let sqlx::Error::Database(db_err) = &err {
            let code = db_err.code().unwrap_or_default();
            let msg = db_err.message();

            // Postgres: 23505 unique, 23503 foreign key.
            // SQLite extended codes: 1555/2067 unique, 787 foreign key.
            let is_unique = db_err.is_unique_violation()
                || code == "23505"
                || code == "2067"
                || code == "1555"
                || msg.contains("UNIQUE constraint failed")
                || msg.contains("duplicate key");
            if is_unique {
                return Self::Conflict("duplicate key".to_string());
            }

            let is_foreign_key = db_err.is_foreign_key_violation()
                || code == "23503"
                || code == "787"
                || msg.contains("FOREIGN KEY constraint failed");
            if is_foreign_key {
                return Self::Reference("unknown client or account".to_string());
            }
        }

        Self::Storage(err.to_string())
    }
}

/// RFC 6749 error body, for callers that answer OAuth requests.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct OAuth2Error {
    pub error: String,
    pub error_description: Option<String>,
    pub error_uri: Option<String>,
}

impl OAuth2Error {
    pub fn new(error: &str, description: Option<&str>) -> Self {
        Self {
            error: error.to_string(),
            error_description: description.map(|s| s.to_string()),
            error_uri: None,
        }
    }

    pub fn invalid_request(description: &str) -> Self {
        Self::new("invalid_request", Some(description))
    }

    pub fn invalid_client(description: &str) -> Self {
        Self::new("invalid_client", Some(description))
    }

    pub fn invalid_grant(description: &str) -> Self {
        Self::new("invalid_grant", Some(description))
    }

    pub fn invalid_scope(description: &str) -> Self {
        Self::new("invalid_scope", Some(description))
    }

    pub fn server_error(description: &str) -> Self {
        Self::new("server_error", Some(description))
    }

    pub fn temporarily_unavailable(description: &str) -> Self {
        Self::new("temporarily_unavailable", Some(description))
    }
}

impl fmt::Display for OAuth2Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {:?}", self.error, self.error_description)
    }
}

impl From<TokenStoreError> for OAuth2Error {
    fn from(err: TokenStoreError) -> Self {
        match &err {
            TokenStoreError::Conflict(_) => Self::invalid_request("duplicate refresh token"),
            TokenStoreError::Reference(_) => Self::invalid_grant("unknown client or account"),
            TokenStoreError::InvalidScope(msg) => Self::invalid_scope(msg),
            TokenStoreError::Cancelled => Self::temporarily_unavailable("request cancelled"),
            // Don't leak storage details to OAuth clients.
            TokenStoreError::ExhaustedRetries { .. }
            | TokenStoreError::EntropyUnavailable(_)
            | TokenStoreError::Storage(_) => Self::server_error("internal error"),
        }
    }
}

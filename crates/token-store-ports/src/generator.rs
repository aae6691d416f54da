use token_store_core::{generate_token, NewRefreshToken, TokenStoreError};

/// Source of new token values.
pub trait TokenGenerator: Send + Sync {
    fn generate(&self) -> Result<String, TokenStoreError>;
}

/// OS CSPRNG backed generator used in production.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecureTokenGenerator;

impl TokenGenerator for SecureTokenGenerator {
    fn generate(&self) -> Result<String, TokenStoreError> {
        generate_token()
    }
}

/// Token values to try, in order, when inserting a candidate.
///
/// A supplied token is tried exactly once. Otherwise up to `max_attempts`
/// values are generated. Backends insert with "do nothing on conflict" and
/// ask for the next value while the insert reports a collision:
///
/// ```ignore
/// let mut attempts = TokenAttempts::new(candidate, generator, max);
/// while let Some(token) = attempts.next_token()? {
///     if let Some(stored) = insert(&token).await? {
///         return Ok(stored);
///     }
/// }
/// Err(attempts.exhausted())
/// ```
pub struct TokenAttempts<'a> {
    supplied: Option<String>,
    generator: &'a dyn TokenGenerator,
    max_attempts: u32,
    made: u32,
}

impl<'a> TokenAttempts<'a> {
    pub fn new(
        candidate: &NewRefreshToken,
        generator: &'a dyn TokenGenerator,
        max_attempts: u32,
    ) -> Self {
        Self {
            supplied: candidate.supplied_token().map(str::to_string),
            generator,
            max_attempts: max_attempts.max(1),
            made: 0,
        }
    }

    /// Next value to insert, or `None` once the attempts are used up.
    pub fn next_token(&mut self) -> Result<Option<String>, TokenStoreError> {
        if self.made >= self.limit() {
            return Ok(None);
        }
        self.made += 1;

        match &self.supplied {
            Some(token) => Ok(Some(token.clone())),
            None => self.generator.generate().map(Some),
        }
    }

    /// Error to report after every attempt collided.
    pub fn exhausted(&self) -> TokenStoreError {
        match &self.supplied {
            Some(token) => TokenStoreError::Conflict(token_store_core::token_prefix(token)),
            None => TokenStoreError::ExhaustedRetries {
                attempts: self.made,
            },
        }
    }

    fn limit(&self) -> u32 {
        if self.supplied.is_some() {
            1
        } else {
            self.max_attempts
        }
    }
}

/// Run the attempt loop with an insert closure.
///
/// Backends that insert through a borrowed transaction drive
/// [`TokenAttempts`] directly instead.
pub async fn issue_with_retry<T, F, Fut>(
    candidate: &NewRefreshToken,
    generator: &dyn TokenGenerator,
    max_attempts: u32,
    mut insert: F,
) -> Result<T, TokenStoreError>
where
    F: FnMut(String) -> Fut,
    Fut: std::future::Future<Output = Result<Option<T>, TokenStoreError>>,
{
    let mut attempts = TokenAttempts::new(candidate, generator, max_attempts);
    while let Some(token) = attempts.next_token()? {
        if let Some(stored) = insert(token).await? {
            return Ok(stored);
        }
    }
    Err(attempts.exhausted())
}

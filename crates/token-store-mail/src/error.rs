#[derive(Debug, thiserror::Error)]
pub enum MailError {
    /// A template failed to parse or render. This is a deployment
    /// misconfiguration and is never retried.
    #[error("e-mail template error: {0}")]
    Template(String),

    #[error("mail configuration error: {0}")]
    Config(String),

    #[error("invalid e-mail address {address:?}: {reason}")]
    Address { address: String, reason: String },

    #[error("e-mail transport error: {0}")]
    Transport(String),

    #[error("e-mail output error: {0}")]
    Io(#[from] std::io::Error),
}

impl MailError {
    /// True for failures that need an operator to fix configuration or templates.
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, MailError::Template(_) | MailError::Config(_))
    }

    pub(crate) fn from_tera(err: tera::Error) -> Self {
        // Tera's top-level message is usually "Failed to render 'x'"; the
        // useful part is further down the source chain.
        let mut message = err.to_string();
        let mut source = std::error::Error::source(&err);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        MailError::Template(message)
    }
}

use async_trait::async_trait;
use lettre::address::Envelope;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use std::io::Write;
use std::sync::Mutex;

use token_store_config::{MailMode, SmtpConfig};

use crate::MailError;

/// Sends an already rendered message.
#[async_trait]
pub trait EmailDispatcher: Send + Sync {
    async fn send(&self, recipients: &[String], message: &[u8]) -> Result<(), MailError>;
}

/// The dispatch strategy selected by `smtp.mode`.
pub enum Dispatcher {
    Smtp(SmtpDispatcher),
    Skip,
    Print(PrintDispatcher),
}

impl Dispatcher {
    pub fn from_config(smtp: &SmtpConfig) -> Result<Self, MailError> {
        let mode = smtp.mail_mode().map_err(MailError::Config)?;
        let dispatcher = match mode {
            MailMode::Smtp => Dispatcher::Smtp(SmtpDispatcher::new(smtp)?),
            MailMode::Skip => Dispatcher::Skip,
            MailMode::Print => Dispatcher::Print(PrintDispatcher::stdout()),
        };

        tracing::info!(mode = %mode, "e-mail dispatcher configured");
        Ok(dispatcher)
    }

    pub fn mode(&self) -> MailMode {
        match self {
            Dispatcher::Smtp(_) => MailMode::Smtp,
            Dispatcher::Skip => MailMode::Skip,
            Dispatcher::Print(_) => MailMode::Print,
        }
    }
}

#[async_trait]
impl EmailDispatcher for Dispatcher {
    async fn send(&self, recipients: &[String], message: &[u8]) -> Result<(), MailError> {
        match self {
            Dispatcher::Smtp(smtp) => smtp.send(recipients, message).await,
            Dispatcher::Skip => {
                tracing::debug!(recipients = recipients.len(), "e-mail dispatch skipped");
                Ok(())
            }
            Dispatcher::Print(print) => print.send(recipients, message).await,
        }
    }
}

/// Writes messages to a local stream instead of sending them.
pub struct PrintDispatcher {
    out: Mutex<Box<dyn Write + Send>>,
}

impl PrintDispatcher {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    fn write_message(&self, message: &[u8]) -> Result<(), MailError> {
        let mut out = self
            .out
            .lock()
            .map_err(|_| MailError::Io(std::io::Error::other("print output lock poisoned")))?;
        out.write_all(b"E-Mail content:\n---\n")?;
        out.write_all(message)?;
        out.write_all(b"---\n")?;
        out.flush()?;
        Ok(())
    }
}

#[async_trait]
impl EmailDispatcher for PrintDispatcher {
    async fn send(&self, _recipients: &[String], message: &[u8]) -> Result<(), MailError> {
        self.write_message(message)
    }
}

/// Delivers through an SMTP relay using STARTTLS and PLAIN/LOGIN credentials.
pub struct SmtpDispatcher {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Address,
}

impl SmtpDispatcher {
    pub fn new(smtp: &SmtpConfig) -> Result<Self, MailError> {
        let from = parse_address(&smtp.from)?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)
            .map_err(|e| MailError::Transport(e.to_string()))?
            .port(smtp.port);

        if let Some(password) = smtp.password.as_deref().filter(|p| !p.is_empty()) {
            // Relays commonly authenticate with the sender address as user name.
            let user = smtp.username.clone().unwrap_or_else(|| smtp.from.clone());
            builder = builder.credentials(Credentials::new(user, password.to_string()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl EmailDispatcher for SmtpDispatcher {
    async fn send(&self, recipients: &[String], message: &[u8]) -> Result<(), MailError> {
        let to = recipients
            .iter()
            .map(|r| parse_address(r))
            .collect::<Result<Vec<_>, _>>()?;

        let envelope = Envelope::new(Some(self.from.clone()), to).map_err(|e| {
            MailError::Address {
                address: recipients.join(", "),
                reason: e.to_string(),
            }
        })?;

        self.transport
            .send_raw(&envelope, message)
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        tracing::debug!(recipients = recipients.len(), "e-mail sent");
        Ok(())
    }
}

fn parse_address(raw: &str) -> Result<Address, MailError> {
    raw.trim()
        .parse::<Address>()
        .map_err(|e| MailError::Address {
            address: raw.to_string(),
            reason: e.to_string(),
        })
}

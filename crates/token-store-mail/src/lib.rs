//! E-mail notification boundary.
//!
//! Upstream flows (revocation notices, ...) render a message with
//! [`MailTemplates`] and hand the bytes to a [`Dispatcher`]. The dispatch
//! strategy is chosen once from `smtp.mode` when configuration is loaded.

pub mod dispatcher;
pub mod error;
pub mod templates;

pub use dispatcher::{Dispatcher, EmailDispatcher, PrintDispatcher, SmtpDispatcher};
pub use error::MailError;
pub use templates::{MailTemplates, StandardFields, LAYOUT_TEMPLATE, PLAIN_TEMPLATE};

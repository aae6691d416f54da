//! Integration ports for the refresh token store.
//!
//! Implement these traits in your own crate to plug in custom persistence
//! without forking.

pub mod cancel;
pub mod generator;
pub mod repository;

pub use cancel::{cancellable, OperationContext};
pub use generator::{issue_with_retry, SecureTokenGenerator, TokenAttempts, TokenGenerator};
pub use repository::*;

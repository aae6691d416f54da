//! Framework-agnostic refresh token domain types and helpers.
//!
//! Storage adapters, the mail boundary and the maintenance binary all build on
//! these types without depending on each other.

pub mod generator;
pub mod models;

pub use generator::{generate_token, TOKEN_BYTES};
pub use models::*;

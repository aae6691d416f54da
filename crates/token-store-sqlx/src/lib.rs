//! SQLx adapter for the refresh token repository.

mod schema;
mod store;

pub use store::{SqlxRefreshTokenStore, DEFAULT_GENERATION_ATTEMPTS};

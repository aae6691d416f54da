pub mod token_service;

pub use token_service::{RevocationNotifier, ServiceError, TokenService, REVOCATION_TEMPLATE};

//! Library exports.
//!
//! The binary (`token-admin`) is a thin shell over these modules; exporting
//! them here keeps integration tests on the same code paths.

pub mod cli;
pub mod services;

pub mod config {
    pub use token_store_config::*;
}

pub mod models {
    pub use token_store_core::*;
}

pub mod storage {
    pub use token_store_factory::*;
    pub use token_store_ports::{
        cancellable, issue_with_retry, OperationContext, SecureTokenGenerator, TokenAttempts,
        TokenGenerator,
    };
}

pub mod mail {
    pub use token_store_mail::*;
}

pub mod telemetry {
    pub use token_store_observability::init_telemetry;
}

pub mod error;
pub mod refresh_token;
pub mod scope;

pub use error::*;
pub use refresh_token::*;
pub use scope::*;

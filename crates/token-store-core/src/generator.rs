use base64::{engine::general_purpose, Engine as _};
use rand::{rngs::OsRng, TryRngCore};

use crate::TokenStoreError;

/// Number of random bytes behind every generated token (256 bits).
pub const TOKEN_BYTES: usize = 32;

/// Generate a new opaque token.
///
/// The bytes come straight from the operating system CSPRNG and are encoded as
/// unpadded URL-safe base64, so the result can be used as a primary key, in a
/// URL, or in an `Authorization` header without escaping.
///
/// A failing entropy source is reported as [`TokenStoreError::EntropyUnavailable`].
/// There is no fallback to a weaker generator.
pub fn generate_token() -> Result<String, TokenStoreError> {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| TokenStoreError::EntropyUnavailable(e.to_string()))?;

    Ok(general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

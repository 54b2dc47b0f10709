//! HMAC-SHA256 webhook signature verification.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Errors that prevent signature verification from even running.
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("webhook secret must not be empty")]
    EmptySecret,
}

/// Verify a `sha256=<hex>` signature header against the raw request body.
///
/// Returns `false` (never an error) for any malformed header, since the
/// caller only needs a yes/no admission decision. Comparison is delegated
/// to `Mac::verify_slice`, which is constant-time in the tag length.
pub fn verify_signature(secret: &[u8], payload: &[u8], header: &str) -> Result<bool, SignatureError> {
    if secret.is_empty() {
        return Err(SignatureError::EmptySecret);
    }

    let Some(hex_digest) = header.strip_prefix("sha256=") else {
        return Ok(false);
    };

    let Ok(expected) = hex::decode(hex_digest) else {
        return Ok(false);
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return Ok(false);
    };
    mac.update(payload);

    Ok(mac.verify_slice(&expected).is_ok())
}

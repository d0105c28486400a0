//! HMAC-SHA256 webhook signature verification.
//!
//! Providers sign the raw request body and send the digest as
//! `x-webhook-signature: sha256=<hex>`. Verification runs over the exact
//! bytes received, before any JSON parsing, and uses the hmac crate's
//! constant-time comparison.

use hmac::{Hmac, Mac};
use leadbridge_core::AdapterError;
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the provider's signature.
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

const SIGNATURE_PREFIX: &str = "sha256=";

/// Check the signature header against the raw body.
///
/// With no shared secret configured, verification is skipped entirely and
/// any signature header is ignored. With a secret, a missing, malformed,
/// or mismatched signature is rejected. The error carries no detail; the
/// secret and the offered signature never reach a response body.
pub fn verify(
    secret: Option<&SecretString>,
    body: &[u8],
    header: Option<&str>,
) -> Result<(), AdapterError> {
    let Some(secret) = secret else {
        debug!("no webhook secret configured, skipping signature verification");
        return Ok(());
    };

    let offered = header
        .and_then(|value| value.strip_prefix(SIGNATURE_PREFIX))
        .ok_or(AdapterError::Signature)?;
    let offered = hex::decode(offered).map_err(|_| AdapterError::Signature)?;

    let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
        .map_err(|_| AdapterError::Signature)?;
    mac.update(body);
    mac.verify_slice(&offered).map_err(|_| AdapterError::Signature)
}

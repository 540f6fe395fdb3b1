//! Webhook signature verification
//!
//! GitHub signs each delivery with `X-Hub-Signature: sha1=<hex>`, an
//! HMAC-SHA1 of the raw body keyed by the webhook secret.

use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::error::BotError;

type HmacSha1 = Hmac<Sha1>;

/// Header carrying the delivery signature
pub const SIGNATURE_HEADER: &str = "X-Hub-Signature";

const SIGNATURE_ALGORITHM: &str = "sha1";

/// Verify a webhook body against its signature header value.
///
/// A missing signature is an error, never "unsigned but trusted". A present
/// but wrong signature yields `Ok(false)`. The digest comparison is
/// constant-time.
pub fn verify_signature(
    body: &[u8],
    signature: Option<&str>,
    secret: &str,
) -> Result<bool, BotError> {
    let Some(signature) = signature else {
        return Err(BotError::Security("webhook from GitHub is not signed".into()));
    };

    let signature_hex = match signature.trim().split_once('=') {
        Some((algorithm, hex)) if algorithm.eq_ignore_ascii_case(SIGNATURE_ALGORITHM) => hex,
        Some(_) => return Ok(false),
        None => signature.trim(),
    };

    let Ok(expected) = hex::decode(signature_hex) else {
        return Ok(false);
    };

    let mut mac = HmacSha1::new_from_slice(secret.as_bytes())
        .map_err(|e| BotError::Security(format!("invalid webhook secret: {}", e)))?;
    mac.update(body);
    Ok(mac.verify_slice(&expected).is_ok())
}

/// Compute the `sha1=<hex>` header value for a body.
pub fn sign(body: &[u8], secret: &str) -> Result<String, BotError> {
    let mut mac = HmacSha1::new_from_slice(secret.as_bytes())
        .map_err(|e| BotError::Security(format!("invalid webhook secret: {}", e)))?;
    mac.update(body);
    Ok(format!(
        "{}={}",
        SIGNATURE_ALGORITHM,
        hex::encode(mac.finalize().into_bytes())
    ))
}

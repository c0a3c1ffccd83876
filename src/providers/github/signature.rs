use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{CILensError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Prefix GitHub puts in front of the hex digest in `X-Hub-Signature-256`.
pub const SIGNATURE_PREFIX: &str = "sha256=";

fn compute_hmac(secret: &[u8], body: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| CILensError::Config(format!("invalid webhook secret: {e}")))?;
    mac.update(body);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Produces a signature header value for `body`, as GitHub would send it.
///
/// # Errors
///
/// Returns a configuration error if the secret cannot key the MAC.
pub fn sign(secret: &[u8], body: &[u8]) -> Result<String> {
    Ok(format!(
        "{SIGNATURE_PREFIX}{}",
        hex::encode(compute_hmac(secret, body)?)
    ))
}

/// Verifies a `sha256=<hex>` signature header against the raw request body.
///
/// # Arguments
///
/// * `secret` - Shared webhook secret
/// * `header` - Signature header value, if the request carried one
/// * `body` - Raw request body, exactly as received
///
/// # Errors
///
/// Returns an authentication error if the header is missing, malformed, or
/// does not match. The digest comparison runs in constant time.
pub fn verify_signature(secret: &[u8], header: Option<&str>, body: &[u8]) -> Result<()> {
    let header =
        header.ok_or_else(|| CILensError::Authentication("missing signature header".into()))?;

    let digest = header
        .strip_prefix(SIGNATURE_PREFIX)
        .ok_or_else(|| CILensError::Authentication("unsupported signature format".into()))?;

    let expected = hex::decode(digest)
        .map_err(|_| CILensError::Authentication("malformed signature digest".into()))?;

    let actual = compute_hmac(secret, body)?;

    if expected.len() != actual.len() || !bool::from(expected.ct_eq(actual.as_slice())) {
        return Err(CILensError::Authentication("signature mismatch".into()));
    }

    Ok(())
}

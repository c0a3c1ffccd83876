use url::form_urlencoded;

use crate::error::{CILensError, Result};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Extracts the JSON document from a webhook body.
///
/// GitHub posts either the JSON document directly or, for hooks configured
/// with the form content type, a `payload=<url-encoded json>` body.
///
/// # Errors
///
/// Returns a validation error if a form body has no `payload` field or the
/// body is empty.
pub fn decode_body(content_type: Option<&str>, body: &[u8]) -> Result<Vec<u8>> {
    let is_form = content_type.is_some_and(|ct| ct.starts_with(FORM_CONTENT_TYPE))
        || body.starts_with(b"payload=");

    if !is_form {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(CILensError::Validation("empty payload".into()));
        }
        return Ok(body.to_vec());
    }

    form_urlencoded::parse(body)
        .find(|(key, _)| key == "payload")
        .map(|(_, value)| value.into_owned().into_bytes())
        .ok_or_else(|| CILensError::Validation("form body has no payload field".into()))
}

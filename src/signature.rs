//! HMAC-SHA256 request signatures for External Actions.
//!
//! The sender signs the exact JSON bytes it transmits and puts the base64
//! digest in the [`SIGNATURE_HEADER`] header. Receivers recompute the digest
//! over the body as received and compare in constant time.
//!
//! There is no nonce or timestamp in the signed material, so a captured
//! request can be replayed for as long as the secret is valid.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::error::ActionError;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-vocode-signature";

/// Status a receiver should answer with when verification fails.
pub const REJECTION_STATUS: u16 = 401;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("signature secret is not valid base64")]
    InvalidSecret,

    #[error("signature secret is empty")]
    EmptySecret,

    #[error("signature header is not valid base64")]
    InvalidEncoding,

    #[error("signature does not match request body")]
    Mismatch,
}

impl From<SignatureError> for ActionError {
    fn from(err: SignatureError) -> Self {
        ActionError::Configuration(err.to_string())
    }
}

/// Decode a base64 secret into raw key bytes. Empty keys are rejected.
pub fn decode_secret(encoded: &str) -> Result<Vec<u8>, SignatureError> {
    let secret = STANDARD
        .decode(encoded.trim())
        .map_err(|_| SignatureError::InvalidSecret)?;
    if secret.is_empty() {
        return Err(SignatureError::EmptySecret);
    }
    Ok(secret)
}

/// Raw HMAC-SHA256 digest of `body` keyed by `secret`.
pub fn digest(secret: &[u8], body: &[u8]) -> Result<Vec<u8>, SignatureError> {
    if secret.is_empty() {
        return Err(SignatureError::EmptySecret);
    }
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| SignatureError::InvalidSecret)?;
    mac.update(body);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Header value for `body`: the base64-encoded digest.
pub fn sign(secret: &[u8], body: &[u8]) -> Result<String, SignatureError> {
    Ok(STANDARD.encode(digest(secret, body)?))
}

/// Verify a header value against the body as received.
pub fn verify(secret: &[u8], body: &[u8], signature: &str) -> Result<(), SignatureError> {
    let provided = STANDARD
        .decode(signature.trim())
        .map_err(|_| SignatureError::InvalidEncoding)?;
    let expected = digest(secret, body)?;

    if bool::from(expected.ct_eq(&provided)) {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// [`verify`] with the secret still in its base64 at-rest form.
pub fn verify_with_encoded_secret(
    encoded_secret: &str,
    body: &[u8],
    signature: &str,
) -> Result<(), SignatureError> {
    verify(&decode_secret(encoded_secret)?, body, signature)
}

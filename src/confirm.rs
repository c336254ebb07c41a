//! Signed email-confirmation tokens.
//!
//! A token is `<payload>.<signature>`: the base64url JSON payload followed by
//! the base64url HMAC-SHA256 of that encoded payload.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Token error types.
#[derive(Error, Debug, PartialEq)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("signature mismatch")]
    BadSignature,
    #[error("token expired")]
    Expired,
    #[error("token has no email")]
    MissingEmail,
    #[error("could not sign token: {0}")]
    Signing(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmTokenPayload {
    pub email: String,
    #[serde(default)]
    pub username: String,
    /// Expiry in unix seconds.
    pub exp: i64,
    pub nonce: String,
}

impl ConfirmTokenPayload {
    /// New payload expiring at `exp` with a fresh random nonce.
    pub fn new(email: impl Into<String>, username: impl Into<String>, exp: i64) -> Self {
        let nonce: [u8; 12] = rand::random();
        Self {
            email: email.into(),
            username: username.into(),
            exp,
            nonce: URL_SAFE_NO_PAD.encode(nonce),
        }
    }
}

fn mac_for(secret: &str) -> Result<HmacSha256, TokenError> {
    HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| TokenError::Signing(e.to_string()))
}

pub fn sign_token(secret: &str, payload: &ConfirmTokenPayload) -> Result<String, TokenError> {
    let raw = serde_json::to_vec(payload).map_err(|e| TokenError::Signing(e.to_string()))?;
    let msg = URL_SAFE_NO_PAD.encode(raw);

    let mut mac = mac_for(secret)?;
    mac.update(msg.as_bytes());
    let sig = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok(format!("{msg}.{sig}"))
}

/// Verify a token's signature and expiry against `now` (unix seconds).
pub fn verify_token(secret: &str, token: &str, now: i64) -> Result<ConfirmTokenPayload, TokenError> {
    let mut parts = token.split('.');
    let (Some(msg), Some(sig), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(TokenError::Malformed);
    };

    let sig = URL_SAFE_NO_PAD.decode(sig).map_err(|_| TokenError::Malformed)?;
    let mut mac = mac_for(secret)?;
    mac.update(msg.as_bytes());
    mac.verify_slice(&sig).map_err(|_| TokenError::BadSignature)?;

    let raw = URL_SAFE_NO_PAD.decode(msg).map_err(|_| TokenError::Malformed)?;
    let payload: ConfirmTokenPayload = serde_json::from_slice(&raw).map_err(|_| TokenError::Malformed)?;

    if payload.exp <= 0 || now > payload.exp {
        return Err(TokenError::Expired);
    }
    if payload.email.trim().is_empty() {
        return Err(TokenError::MissingEmail);
    }
    Ok(payload)
}

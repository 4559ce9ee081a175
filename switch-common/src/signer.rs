//! # Credential Signer
//!
//! Purpose: Derive the signed token request that exchanges a service key and
//! secret for a short-lived access credential.
//!
//! The service expects `hex(md5(secret ++ expiry_millis))`. MD5 is not a strong
//! authentication primitive; `SignatureScheme::HmacSha256` is offered for
//! deployments that accept it, but its signatures are not interchangeable with
//! the legacy scheme.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{SwitchError, SwitchResult};
use crate::types::ConnectionProfile;

/// Digest used to sign token requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignatureScheme {
    /// `md5(secret ++ millis)`, what the service accepts today.
    #[default]
    LegacyMd5,
    /// `hmac_sha256(key = secret, msg = millis)`.
    HmacSha256,
}

/// Expiry instant as Unix epoch milliseconds, the unit used on the wire.
#[inline]
pub fn expiry_millis(instant: DateTime<Utc>) -> i64 {
    instant.timestamp_millis()
}

/// Signs `secret` and `expires_at` with the given scheme.
///
/// Output is lowercase hex.
pub fn sign(scheme: SignatureScheme, secret: &str, expires_at: DateTime<Utc>) -> SwitchResult<String> {
    let millis = expiry_millis(expires_at).to_string();
    match scheme {
        SignatureScheme::LegacyMd5 => {
            let mut hasher = Md5::new();
            hasher.update(secret.as_bytes());
            hasher.update(millis.as_bytes());
            Ok(hex::encode(hasher.finalize()))
        }
        SignatureScheme::HmacSha256 => {
            let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
                .map_err(|err| SwitchError::Configuration(format!("signing key: {err}")))?;
            mac.update(millis.as_bytes());
            Ok(hex::encode(mac.finalize().into_bytes()))
        }
    }
}

/// Header set for `GET /Token`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRequest {
    pub api_key: String,
    pub signature: String,
    pub expire_millis: i64,
}

impl TokenRequest {
    /// Signs a token request for the profile's key, secret, and expiry.
    pub fn for_profile(profile: &ConnectionProfile, scheme: SignatureScheme) -> SwitchResult<Self> {
        Ok(TokenRequest {
            api_key: profile.api_key().to_string(),
            signature: sign(scheme, profile.api_secret(), profile.expires_at())?,
            expire_millis: expiry_millis(profile.expires_at()),
        })
    }

    /// Metadata carried on the token call, in send order.
    pub fn headers(&self) -> [(&'static str, String); 3] {
        [
            ("APIKey", self.api_key.clone()),
            ("Signature", self.signature.clone()),
            ("Expire", self.expire_millis.to_string()),
        ]
    }
}
